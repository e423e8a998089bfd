// 📤 Tabular Export - case aggregates → six-sheet spreadsheet
//
// Precondition for every operation here: the caller has already checked
// that the requester holds elevated privilege. Nothing in this module looks
// at who is asking.

pub mod tables;
pub mod workbook;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::info;

use crate::entities::CaseAggregate;
use crate::source::CaseSource;

pub use tables::{flatten_cases, workbook_fingerprint, CellValue, SheetKind, SheetTable};
pub use workbook::render_workbook;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const ALL_CASES_FILENAME: &str = "all_cases_data.xlsx";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ExportError {
    /// No case has the requested id; nothing was built
    #[error("case {0} not found")]
    NotFound(i64),

    /// The case source failed while loading aggregates
    #[error("failed to load cases: {0:#}")]
    Source(#[source] anyhow::Error),

    /// The spreadsheet writer rejected a value
    #[error("failed to write spreadsheet: {0}")]
    Serialization(String),
}

// ============================================================================
// EXPORT FILE
// ============================================================================

/// Serialized workbook plus what a response needs to deliver it
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    /// Hash of the sheet contents (stable across re-exports of equal data)
    pub fingerprint: String,
    pub case_count: usize,
}

impl ExportFile {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }

    /// Write the workbook to `path`
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, &self.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

pub fn single_case_filename(case_id: i64) -> String {
    format!("case_{}_data.xlsx", case_id)
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct TabularExportBuilder;

impl TabularExportBuilder {
    pub fn new() -> Self {
        TabularExportBuilder
    }

    /// Export one case, looked up by id
    ///
    /// Fails with `NotFound` before any sheet is built when the id does not
    /// resolve.
    pub fn export_single_case<S>(&self, source: &S, case_id: i64) -> Result<ExportFile, ExportError>
    where
        S: CaseSource + ?Sized,
    {
        let aggregate = source
            .find_case(case_id)
            .map_err(ExportError::Source)?
            .ok_or(ExportError::NotFound(case_id))?;

        self.build_case(&aggregate)
    }

    /// Export every case the source holds, in store order
    pub fn export_all_cases<S>(&self, source: &S) -> Result<ExportFile, ExportError>
    where
        S: CaseSource + ?Sized,
    {
        let cases = source.all_cases().map_err(ExportError::Source)?;
        self.build_all(&cases)
    }

    /// Export an already loaded aggregate
    pub fn build_case(&self, aggregate: &CaseAggregate) -> Result<ExportFile, ExportError> {
        let tables = flatten_cases(std::iter::once(aggregate));
        let file = self.finish(&tables, single_case_filename(aggregate.id()), 1)?;

        info!(
            case_id = aggregate.id(),
            children = aggregate.child_count(),
            bytes = file.bytes.len(),
            "exported case"
        );
        Ok(file)
    }

    /// Export already loaded aggregates; an empty slice gives header-only sheets
    pub fn build_all(&self, cases: &[CaseAggregate]) -> Result<ExportFile, ExportError> {
        let tables = flatten_cases(cases);
        let file = self.finish(&tables, ALL_CASES_FILENAME.to_string(), cases.len())?;

        info!(
            cases = cases.len(),
            bytes = file.bytes.len(),
            "exported all cases"
        );
        Ok(file)
    }

    /// Sheet tables without rendering, for callers that want rows only
    pub fn tables(&self, cases: &[CaseAggregate]) -> Vec<SheetTable> {
        flatten_cases(cases)
    }

    fn finish(
        &self,
        tables: &[SheetTable],
        filename: String,
        case_count: usize,
    ) -> Result<ExportFile, ExportError> {
        let bytes = render_workbook(tables)?;

        Ok(ExportFile {
            filename,
            content_type: XLSX_CONTENT_TYPE,
            bytes,
            fingerprint: workbook_fingerprint(tables),
            case_count,
        })
    }
}

// ============================================================================
// CSV OUTPUT (one file per sheet)
// ============================================================================

/// Write each table as `<dir>/<sheet_stem>.csv`, header row first
pub fn write_csv_dir(tables: &[SheetTable], dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for table in tables {
        let path = dir.join(format!("{}.csv", table.kind.file_stem()));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        writer.write_record(table.headers())?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        writer.flush()?;

        written.push(path);
    }

    Ok(written)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        Case, FamilyExpense, FamilyIncome, FamilyMember, Gender, MarriageStatus,
    };

    fn aggregate(id: i64, name: &str) -> CaseAggregate {
        let mut aggregate =
            CaseAggregate::new(Case::new(id, name, Gender::Female, MarriageStatus::Single));
        aggregate
            .family_members
            .push(FamilyMember::new(id, "Omar", Gender::Male, 10));
        aggregate
            .family_income
            .push(FamilyIncome::new(id, "Salary", 500.0));
        aggregate
    }

    #[test]
    fn test_single_case_not_found() {
        let cases = vec![aggregate(1, "Sara Ali")];
        let builder = TabularExportBuilder::new();

        let err = builder.export_single_case(&cases, 2).unwrap_err();
        assert!(matches!(err, ExportError::NotFound(2)));
        assert_eq!(err.to_string(), "case 2 not found");
    }

    #[test]
    fn test_single_case_file_metadata() {
        let cases = vec![aggregate(1, "Sara Ali"), aggregate(2, "Huda Saleh")];
        let file = TabularExportBuilder::new()
            .export_single_case(cases.as_slice(), 2)
            .unwrap();

        assert_eq!(file.filename, "case_2_data.xlsx");
        assert_eq!(file.content_type, XLSX_CONTENT_TYPE);
        assert_eq!(
            file.content_disposition(),
            "attachment; filename=\"case_2_data.xlsx\""
        );
        assert_eq!(file.case_count, 1);
        assert!(!file.bytes.is_empty());
    }

    #[test]
    fn test_all_cases_file_metadata() {
        let cases = vec![aggregate(1, "Sara Ali"), aggregate(2, "Huda Saleh")];
        let file = TabularExportBuilder::new().export_all_cases(&cases).unwrap();

        assert_eq!(file.filename, ALL_CASES_FILENAME);
        assert_eq!(file.case_count, 2);
    }

    #[test]
    fn test_empty_collection_is_valid_export() {
        let cases: Vec<CaseAggregate> = Vec::new();
        let file = TabularExportBuilder::new().export_all_cases(&cases).unwrap();

        assert_eq!(file.case_count, 0);
        assert!(!file.bytes.is_empty());
    }

    #[test]
    fn test_reexport_has_same_fingerprint() {
        let cases = vec![aggregate(1, "Sara Ali"), aggregate(2, "Huda Saleh")];
        let builder = TabularExportBuilder::new();

        let first = builder.export_all_cases(&cases).unwrap();
        let second = builder.export_all_cases(&cases).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);

        let single = builder.export_single_case(&cases, 1).unwrap();
        assert_ne!(first.fingerprint, single.fingerprint);
    }

    #[test]
    fn test_source_failure_is_reported() {
        struct BrokenSource;

        impl CaseSource for BrokenSource {
            fn find_case(&self, _case_id: i64) -> anyhow::Result<Option<CaseAggregate>> {
                anyhow::bail!("database is locked")
            }

            fn all_cases(&self) -> anyhow::Result<Vec<CaseAggregate>> {
                anyhow::bail!("database is locked")
            }
        }

        let builder = TabularExportBuilder::new();
        let err = builder.export_single_case(&BrokenSource, 1).unwrap_err();
        assert!(matches!(err, ExportError::Source(_)));
        assert!(err.to_string().contains("database is locked"));
        assert!(matches!(
            builder.export_all_cases(&BrokenSource),
            Err(ExportError::Source(_))
        ));
    }

    #[test]
    fn test_write_csv_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut sara = aggregate(3, "Sara Ali");
        sara.family_expenses
            .push(FamilyExpense::new(3, "Bus fare", 12.345));
        let tables = TabularExportBuilder::new().tables(&[sara]);

        let written = write_csv_dir(&tables, dir.path()).unwrap();
        assert_eq!(written.len(), 6);

        let income = std::fs::read_to_string(dir.path().join("family_income.csv")).unwrap();
        assert_eq!(income, "Case ID,Source,Amount\n3,Salary,500\n");

        // Fractions survive as stored, not rounded to cents
        let expenses = std::fs::read_to_string(dir.path().join("family_expenses.csv")).unwrap();
        assert!(expenses.contains(",12.345,"), "{}", expenses);

        let notes = std::fs::read_to_string(dir.path().join("notes.csv")).unwrap();
        assert_eq!(notes.lines().count(), 1);
    }
}
