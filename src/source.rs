// 🔌 Case Source - where export builders get their aggregates from
//
// The store owns entity lifecycle; a source only reads. SQLite implements
// this in `db`, and a plain slice of aggregates implements it for callers
// that already hold the data in memory.

use anyhow::Result;

use crate::entities::CaseAggregate;

pub trait CaseSource {
    /// One aggregate by case id, or None when no case has that id
    fn find_case(&self, case_id: i64) -> Result<Option<CaseAggregate>>;

    /// Every aggregate, in store order
    fn all_cases(&self) -> Result<Vec<CaseAggregate>>;
}

impl CaseSource for [CaseAggregate] {
    fn find_case(&self, case_id: i64) -> Result<Option<CaseAggregate>> {
        Ok(self.iter().find(|a| a.id() == case_id).cloned())
    }

    fn all_cases(&self) -> Result<Vec<CaseAggregate>> {
        Ok(self.to_vec())
    }
}

impl CaseSource for Vec<CaseAggregate> {
    fn find_case(&self, case_id: i64) -> Result<Option<CaseAggregate>> {
        self.as_slice().find_case(case_id)
    }

    fn all_cases(&self) -> Result<Vec<CaseAggregate>> {
        self.as_slice().all_cases()
    }
}
