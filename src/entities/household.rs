// 👪 Household Records - members, money in, money out, medical costs
//
// Every record belongs to exactly one Case through `case_id`.
// `id` is the store's row id (0 until persisted).

use serde::{Deserialize, Serialize};

use super::labels::Gender;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub case_id: i64,
    pub name: String,
    pub gender: Gender,
    pub age: u32,
    #[serde(default)]
    pub qualification: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub notes: String,
}

impl FamilyMember {
    pub fn new(case_id: i64, name: &str, gender: Gender, age: u32) -> Self {
        FamilyMember {
            id: 0,
            case_id,
            name: name.to_string(),
            gender,
            age,
            qualification: String::new(),
            occupation: String::new(),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyExpense {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub case_id: i64,
    /// Label of the expense ("Rent", "Electricity")
    pub statement: String,
    pub amount: f64,
    #[serde(default)]
    pub notes: String,
}

impl FamilyExpense {
    pub fn new(case_id: i64, statement: &str, amount: f64) -> Self {
        FamilyExpense {
            id: 0,
            case_id,
            statement: statement.to_string(),
            amount,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyIncome {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub case_id: i64,
    pub source_name: String,
    pub amount: f64,
}

impl FamilyIncome {
    pub fn new(case_id: i64, source_name: &str, amount: f64) -> Self {
        FamilyIncome {
            id: 0,
            case_id,
            source_name: source_name.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalExpense {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub case_id: i64,
    pub full_name: String,
    #[serde(default)]
    pub disease_type: String,
    #[serde(default)]
    pub medicine: String,
    #[serde(default)]
    pub insurance_id: String,
}

impl MedicalExpense {
    pub fn new(case_id: i64, full_name: &str, disease_type: &str, medicine: &str) -> Self {
        MedicalExpense {
            id: 0,
            case_id,
            full_name: full_name.to_string(),
            disease_type: disease_type.to_string(),
            medicine: medicine.to_string(),
            insurance_id: String::new(),
        }
    }
}
