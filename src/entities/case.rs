// 📁 Case Entity - the root of every export
//
// A Case owns five child collections by identifier. The aggregate below is
// what the data layer hands to the export builder: a Case plus its children,
// already loaded and in store order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::household::{FamilyExpense, FamilyIncome, FamilyMember, MedicalExpense};
use super::labels::{Gender, MarriageStatus};
use super::note::Note;

// ============================================================================
// LOOKUP ENTITIES (optional references from a Case)
// ============================================================================

/// Category of help a case receives ("Food basket", "Rent", ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeHelp {
    pub id: i64,
    pub type_help: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub region: String,
    #[serde(default)]
    pub city: String,
}

// ============================================================================
// CASE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    pub name: String,
    pub gender: Gender,
    pub marriage_status: MarriageStatus,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub national_id: String,

    /// Nullable association - None renders as an empty cell
    #[serde(default)]
    pub type_help: Option<TypeHelp>,

    /// Nullable association - None renders as an empty cell
    #[serde(default)]
    pub region: Option<Region>,
}

impl Case {
    pub fn new(id: i64, name: &str, gender: Gender, marriage_status: MarriageStatus) -> Self {
        Case {
            id,
            name: name.to_string(),
            gender,
            marriage_status,
            birth_date: None,
            national_id: String::new(),
            type_help: None,
            region: None,
        }
    }

    /// Label of the type-of-help reference, if one is set
    pub fn type_help_label(&self) -> Option<&str> {
        self.type_help.as_ref().map(|t| t.type_help.as_str())
    }

    /// Label of the region reference, if one is set
    pub fn region_label(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.region.as_str())
    }
}

/// Writable case fields, with lookup references given by id
///
/// This is what create/edit requests carry; the store resolves the ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInput {
    pub name: String,
    pub gender: Gender,
    pub marriage_status: MarriageStatus,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub national_id: String,
    #[serde(default)]
    pub type_help_id: Option<i64>,
    #[serde(default)]
    pub region_id: Option<i64>,
}

impl From<&Case> for CaseInput {
    fn from(case: &Case) -> Self {
        CaseInput {
            name: case.name.clone(),
            gender: case.gender,
            marriage_status: case.marriage_status,
            birth_date: case.birth_date,
            national_id: case.national_id.clone(),
            type_help_id: case.type_help.as_ref().map(|t| t.id),
            region_id: case.region.as_ref().map(|r| r.id),
        }
    }
}

// ============================================================================
// CASE AGGREGATE
// ============================================================================

/// A Case together with its directly owned child collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseAggregate {
    pub case: Case,
    #[serde(default)]
    pub family_members: Vec<FamilyMember>,
    #[serde(default)]
    pub family_expenses: Vec<FamilyExpense>,
    #[serde(default)]
    pub family_income: Vec<FamilyIncome>,
    #[serde(default)]
    pub medical_expenses: Vec<MedicalExpense>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl CaseAggregate {
    pub fn new(case: Case) -> Self {
        CaseAggregate {
            case,
            family_members: Vec::new(),
            family_expenses: Vec::new(),
            family_income: Vec::new(),
            medical_expenses: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.case.id
    }

    /// Total number of child records across all five collections
    pub fn child_count(&self) -> usize {
        self.family_members.len()
            + self.family_expenses.len()
            + self.family_income.len()
            + self.medical_expenses.len()
            + self.notes.len()
    }

    /// Re-point every child record at this aggregate's case
    ///
    /// Used when importing aggregates whose children omit `case_id`.
    pub fn adopt_children(&mut self) {
        let id = self.case.id;
        self.family_members.iter_mut().for_each(|m| m.case_id = id);
        self.family_expenses.iter_mut().for_each(|e| e.case_id = id);
        self.family_income.iter_mut().for_each(|i| i.case_id = id);
        self.medical_expenses.iter_mut().for_each(|m| m.case_id = id);
        self.notes.iter_mut().for_each(|n| n.case_id = id);
    }
}

// ============================================================================
// TESTS
// ============================================================================
