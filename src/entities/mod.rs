// Entity Models - the relational subtree rooted at a Case
//
// Lifecycle belongs to the store (`db`); exports only read these.

pub mod labels;
pub mod case;
pub mod household;
pub mod note;

pub use labels::{Gender, LabelError, MarriageStatus, GENDER_LABELS, MARRIAGE_STATUS_LABELS};
pub use case::{Case, CaseAggregate, CaseInput, Region, TypeHelp};
pub use household::{FamilyExpense, FamilyIncome, FamilyMember, MedicalExpense};
pub use note::Note;
