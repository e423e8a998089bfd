// 📝 Interview Note - one caseworker visit, with opinions and a rating

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub case_id: i64,
    pub note_header: String,
    #[serde(default)]
    pub human_needs: String,
    #[serde(default)]
    pub other_help: String,
    #[serde(default)]
    pub interview_description: String,
    #[serde(default)]
    pub interview_result: String,
    #[serde(default)]
    pub researcher_opinion: String,
    #[serde(default)]
    pub supervisor_opinion: String,
    #[serde(default)]
    pub overall_rating: i64,
}

impl Note {
    pub fn new(case_id: i64, note_header: &str, overall_rating: i64) -> Self {
        Note {
            id: 0,
            case_id,
            note_header: note_header.to_string(),
            human_needs: String::new(),
            other_help: String::new(),
            interview_description: String::new(),
            interview_result: String::new(),
            researcher_opinion: String::new(),
            supervisor_opinion: String::new(),
            overall_rating,
        }
    }
}
