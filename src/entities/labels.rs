// 🏷️ Display Labels - stored code → human-readable label
//
// Gender and marriage status are stored as short codes ("F", "M", ...).
// Every place that renders them for a person goes through the tables below,
// so the single-case and all-cases exports can never disagree.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// LOOKUP TABLES (code, label) - index matches the enum discriminant
// ============================================================================

pub const GENDER_LABELS: [(&str, &str); 2] = [("M", "Male"), ("F", "Female")];

pub const MARRIAGE_STATUS_LABELS: [(&str, &str); 4] = [
    ("S", "Single"),
    ("M", "Married"),
    ("D", "Divorced"),
    ("W", "Widowed"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field} code: {code:?}")]
pub struct LabelError {
    pub field: &'static str,
    pub code: String,
}

fn position_of(table: &[(&str, &str)], code: &str) -> Option<usize> {
    table.iter().position(|(c, _)| *c == code)
}

// ============================================================================
// GENDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Gender {
    Male = 0,
    Female = 1,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    /// Stored code ("M" / "F")
    pub fn code(self) -> &'static str {
        GENDER_LABELS[self as usize].0
    }

    /// Human-readable label ("Male" / "Female")
    pub fn label(self) -> &'static str {
        GENDER_LABELS[self as usize].1
    }

    pub fn from_code(code: &str) -> Result<Self, LabelError> {
        position_of(&GENDER_LABELS, code)
            .map(|idx| Self::ALL[idx])
            .ok_or_else(|| LabelError {
                field: "gender",
                code: code.to_string(),
            })
    }
}

impl TryFrom<String> for Gender {
    type Error = LabelError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Gender::from_code(&code)
    }
}

impl From<Gender> for &'static str {
    fn from(gender: Gender) -> Self {
        gender.code()
    }
}

// ============================================================================
// MARRIAGE STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum MarriageStatus {
    Single = 0,
    Married = 1,
    Divorced = 2,
    Widowed = 3,
}

impl MarriageStatus {
    pub const ALL: [MarriageStatus; 4] = [
        MarriageStatus::Single,
        MarriageStatus::Married,
        MarriageStatus::Divorced,
        MarriageStatus::Widowed,
    ];

    pub fn code(self) -> &'static str {
        MARRIAGE_STATUS_LABELS[self as usize].0
    }

    pub fn label(self) -> &'static str {
        MARRIAGE_STATUS_LABELS[self as usize].1
    }

    pub fn from_code(code: &str) -> Result<Self, LabelError> {
        position_of(&MARRIAGE_STATUS_LABELS, code)
            .map(|idx| Self::ALL[idx])
            .ok_or_else(|| LabelError {
                field: "marriage status",
                code: code.to_string(),
            })
    }
}

impl TryFrom<String> for MarriageStatus {
    type Error = LabelError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        MarriageStatus::from_code(&code)
    }
}

impl From<MarriageStatus> for &'static str {
    fn from(status: MarriageStatus) -> Self {
        status.code()
    }
}

// ============================================================================
// TESTS
// ============================================================================
