// 📋 Sheet Tables - flatten case aggregates into rows
//
// For each case, for each child collection, for each child record: one row
// whose first column is the owning case id. No sorting, no aggregation; the
// only computed values are label lookups for enums and optional references.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

use crate::entities::{
    Case, CaseAggregate, FamilyExpense, FamilyIncome, FamilyMember, MedicalExpense, Note,
};

// ============================================================================
// SHEET KINDS (fixed order, fixed headers)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetKind {
    Case,
    FamilyMembers,
    FamilyExpenses,
    FamilyIncome,
    MedicalExpenses,
    Notes,
}

impl SheetKind {
    /// Workbook order
    pub const ALL: [SheetKind; 6] = [
        SheetKind::Case,
        SheetKind::FamilyMembers,
        SheetKind::FamilyExpenses,
        SheetKind::FamilyIncome,
        SheetKind::MedicalExpenses,
        SheetKind::Notes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SheetKind::Case => "Case",
            SheetKind::FamilyMembers => "Family Members",
            SheetKind::FamilyExpenses => "Family Expenses",
            SheetKind::FamilyIncome => "Family Income",
            SheetKind::MedicalExpenses => "Medical Expenses",
            SheetKind::Notes => "Notes",
        }
    }

    pub fn headers(self) -> &'static [&'static str] {
        match self {
            SheetKind::Case => &[
                "ID",
                "Name",
                "Gender",
                "Marriage Status",
                "Birth Date",
                "National ID",
                "Type Help",
                "Region",
            ],
            SheetKind::FamilyMembers => &[
                "Case ID",
                "Name",
                "Gender",
                "Age",
                "Qualification",
                "Occupation",
                "Notes",
            ],
            SheetKind::FamilyExpenses => &["Case ID", "Statement", "Amount", "Notes"],
            SheetKind::FamilyIncome => &["Case ID", "Source", "Amount"],
            SheetKind::MedicalExpenses => &[
                "Case ID",
                "Full Name",
                "Disease Type",
                "Medicine",
                "Insurance ID",
            ],
            SheetKind::Notes => &[
                "Case ID",
                "Note Header",
                "Human Needs",
                "Other Help",
                "Interview Description",
                "Interview Result",
                "Researcher Opinion",
                "Supervisor Opinion",
                "Overall Rating",
            ],
        }
    }

    /// File stem used for per-sheet CSV output ("family_members")
    pub fn file_stem(self) -> String {
        self.name().to_lowercase().replace(' ', "_")
    }
}

// ============================================================================
// CELL VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn text(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }

    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    /// Type-tagged form, so "10" the string and 10 the number differ
    fn tagged(&self) -> String {
        match self {
            CellValue::Text(s) => format!("s:{}", s),
            CellValue::Integer(i) => format!("i:{}", i),
            CellValue::Number(n) => format!("n:{}", n),
            CellValue::Date(d) => format!("d:{}", d.format("%Y-%m-%d")),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

// ============================================================================
// SHEET TABLE
// ============================================================================

/// One sheet's worth of data rows (the header comes from `kind`)
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub kind: SheetKind,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    pub fn new(kind: SheetKind) -> Self {
        SheetTable {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn headers(&self) -> &'static [&'static str] {
        self.kind.headers()
    }

    pub fn data_row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows whose first column equals `case_id`
    pub fn rows_for_case(&self, case_id: i64) -> Vec<&Vec<CellValue>> {
        self.rows
            .iter()
            .filter(|row| matches!(row.first(), Some(CellValue::Integer(id)) if *id == case_id))
            .collect()
    }

    /// SHA-256 over sheet name, headers and every cell (hex)
    ///
    /// Every field and row is length-prefixed, so cell contents can never
    /// imitate a boundary.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, self.name());
        hash_len(&mut hasher, self.headers().len());
        for header in self.headers() {
            hash_field(&mut hasher, header);
        }
        hash_len(&mut hasher, self.rows.len());
        for row in &self.rows {
            hash_len(&mut hasher, row.len());
            for cell in row {
                hash_field(&mut hasher, &cell.tagged());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

fn hash_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn hash_field(hasher: &mut Sha256, field: &str) {
    hash_len(hasher, field.len());
    hasher.update(field.as_bytes());
}

/// Combined fingerprint of a full workbook's tables
pub fn workbook_fingerprint(tables: &[SheetTable]) -> String {
    let mut hasher = Sha256::new();
    for table in tables {
        hasher.update(table.fingerprint());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// ROW BUILDERS
// ============================================================================

fn optional_label(label: Option<&str>) -> CellValue {
    match label {
        Some(label) => CellValue::text(label),
        None => CellValue::empty(),
    }
}

fn case_row(case: &Case) -> Vec<CellValue> {
    let birth_date = match case.birth_date {
        Some(date) => CellValue::Date(date),
        None => CellValue::empty(),
    };

    vec![
        CellValue::Integer(case.id),
        CellValue::text(&case.name),
        CellValue::text(case.gender.label()),
        CellValue::text(case.marriage_status.label()),
        birth_date,
        CellValue::text(&case.national_id),
        optional_label(case.type_help_label()),
        optional_label(case.region_label()),
    ]
}

fn member_row(case_id: i64, member: &FamilyMember) -> Vec<CellValue> {
    vec![
        CellValue::Integer(case_id),
        CellValue::text(&member.name),
        CellValue::text(member.gender.label()),
        CellValue::Integer(i64::from(member.age)),
        CellValue::text(&member.qualification),
        CellValue::text(&member.occupation),
        CellValue::text(&member.notes),
    ]
}

fn expense_row(case_id: i64, expense: &FamilyExpense) -> Vec<CellValue> {
    vec![
        CellValue::Integer(case_id),
        CellValue::text(&expense.statement),
        CellValue::Number(expense.amount),
        CellValue::text(&expense.notes),
    ]
}

fn income_row(case_id: i64, income: &FamilyIncome) -> Vec<CellValue> {
    vec![
        CellValue::Integer(case_id),
        CellValue::text(&income.source_name),
        CellValue::Number(income.amount),
    ]
}

fn medical_row(case_id: i64, medical: &MedicalExpense) -> Vec<CellValue> {
    vec![
        CellValue::Integer(case_id),
        CellValue::text(&medical.full_name),
        CellValue::text(&medical.disease_type),
        CellValue::text(&medical.medicine),
        CellValue::text(&medical.insurance_id),
    ]
}

fn note_row(case_id: i64, note: &Note) -> Vec<CellValue> {
    vec![
        CellValue::Integer(case_id),
        CellValue::text(&note.note_header),
        CellValue::text(&note.human_needs),
        CellValue::text(&note.other_help),
        CellValue::text(&note.interview_description),
        CellValue::text(&note.interview_result),
        CellValue::text(&note.researcher_opinion),
        CellValue::text(&note.supervisor_opinion),
        CellValue::Integer(note.overall_rating),
    ]
}

/// Append one row per child that belongs to `case_id`, skipping strays
fn append_children<T>(
    table: &mut SheetTable,
    case_id: i64,
    children: &[T],
    owner: impl Fn(&T) -> i64,
    row: impl Fn(i64, &T) -> Vec<CellValue>,
) {
    for child in children {
        let child_case = owner(child);
        if child_case != case_id {
            warn!(
                sheet = table.name(),
                case_id,
                child_case,
                "skipping child record that belongs to another case"
            );
            continue;
        }
        table.rows.push(row(case_id, child));
    }
}

// ============================================================================
// FLATTENING
// ============================================================================

/// Flatten aggregates (in the given order) into the six sheet tables
pub fn flatten_cases<'a, I>(cases: I) -> Vec<SheetTable>
where
    I: IntoIterator<Item = &'a CaseAggregate>,
{
    let mut case_sheet = SheetTable::new(SheetKind::Case);
    let mut members = SheetTable::new(SheetKind::FamilyMembers);
    let mut expenses = SheetTable::new(SheetKind::FamilyExpenses);
    let mut income = SheetTable::new(SheetKind::FamilyIncome);
    let mut medical = SheetTable::new(SheetKind::MedicalExpenses);
    let mut notes = SheetTable::new(SheetKind::Notes);

    for aggregate in cases {
        let case_id = aggregate.id();
        case_sheet.rows.push(case_row(&aggregate.case));

        append_children(&mut members, case_id, &aggregate.family_members, |m| m.case_id, member_row);
        append_children(&mut expenses, case_id, &aggregate.family_expenses, |e| e.case_id, expense_row);
        append_children(&mut income, case_id, &aggregate.family_income, |i| i.case_id, income_row);
        append_children(&mut medical, case_id, &aggregate.medical_expenses, |m| m.case_id, medical_row);
        append_children(&mut notes, case_id, &aggregate.notes, |n| n.case_id, note_row);
    }

    vec![case_sheet, members, expenses, income, medical, notes]
}

// ============================================================================
// TESTS
// ============================================================================
