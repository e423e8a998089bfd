// Case Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod entities;
pub mod source;
pub mod db;
pub mod export;
pub mod config;
pub mod access;

// Re-export commonly used types
pub use entities::{
    Case, CaseAggregate, CaseInput, FamilyExpense, FamilyIncome, FamilyMember, Gender, LabelError,
    MarriageStatus, MedicalExpense, Note, Region, TypeHelp,
};
pub use source::CaseSource;
pub use db::{
    setup_database, insert_aggregate, insert_case, insert_family_member, insert_family_expense,
    insert_family_income, insert_medical_expense, insert_note, ensure_region, ensure_type_help,
    create_region, create_type_help, list_regions, list_type_help, create_case, update_case,
    update_family_member, update_family_expense, update_family_income, update_medical_expense,
    update_note, delete_family_member, delete_family_expense, delete_family_income,
    delete_medical_expense, delete_note, ChildRecord, load_json, delete_case, get_case,
    get_case_aggregate, get_all_case_aggregates, list_cases, search_cases, count_cases,
};
pub use export::{
    ExportError, ExportFile, TabularExportBuilder, SheetKind, SheetTable, CellValue,
    write_csv_dir, XLSX_CONTENT_TYPE,
};
pub use config::AppConfig;
pub use access::{
    privilege_for, Privilege, PERMISSION_DENIED, REGION_PERMISSION_DENIED,
    TYPE_HELP_PERMISSION_DENIED,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
