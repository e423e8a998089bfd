use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::entities::{
    Case, CaseAggregate, CaseInput, FamilyExpense, FamilyIncome, FamilyMember, Gender, MarriageStatus,
    MedicalExpense, Note, Region, TypeHelp,
};
use crate::source::CaseSource;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Stored codes <-> enums
// ============================================================================

impl ToSql for Gender {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Gender {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Gender::from_code(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for MarriageStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for MarriageStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        MarriageStatus::from_code(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Lookup tables (optional references from cases)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS regions (
            id INTEGER PRIMARY KEY,
            region TEXT NOT NULL,
            city TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS type_help (
            id INTEGER PRIMARY KEY,
            type_help TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Cases
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            gender TEXT NOT NULL,
            marriage_status TEXT NOT NULL,
            birth_date TEXT,
            national_id TEXT NOT NULL DEFAULT '',
            type_help_id INTEGER REFERENCES type_help(id) ON DELETE SET NULL,
            region_id INTEGER REFERENCES regions(id) ON DELETE SET NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Child collections (all owned by exactly one case)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS family_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            gender TEXT NOT NULL,
            age INTEGER NOT NULL,
            qualification TEXT NOT NULL DEFAULT '',
            occupation TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS family_expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            statement TEXT NOT NULL,
            amount REAL NOT NULL,
            notes TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS family_income (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            source_name TEXT NOT NULL,
            amount REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS medical_expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            full_name TEXT NOT NULL,
            disease_type TEXT NOT NULL DEFAULT '',
            medicine TEXT NOT NULL DEFAULT '',
            insurance_id TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
            note_header TEXT NOT NULL,
            human_needs TEXT NOT NULL DEFAULT '',
            other_help TEXT NOT NULL DEFAULT '',
            interview_description TEXT NOT NULL DEFAULT '',
            interview_result TEXT NOT NULL DEFAULT '',
            researcher_opinion TEXT NOT NULL DEFAULT '',
            supervisor_opinion TEXT NOT NULL DEFAULT '',
            overall_rating INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    for table in [
        "family_members",
        "family_expenses",
        "family_income",
        "medical_expenses",
        "notes",
    ] {
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_case ON {table}(case_id)",
                table = table
            ),
            [],
        )?;
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cases_name ON cases(name)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Inserts
// ============================================================================

/// Make sure region `id` exists with this label
///
/// An existing row is never renamed; a different label for the same id is
/// an error.
pub fn ensure_region(conn: &Connection, region: &Region) -> Result<()> {
    conn.execute(
        "INSERT INTO regions (id, region, city) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO NOTHING",
        params![region.id, region.region, region.city],
    )?;

    let stored: String =
        conn.query_row("SELECT region FROM regions WHERE id = ?1", [region.id], |row| row.get(0))?;
    if stored != region.region {
        bail!(
            "Region {} is stored as {:?}, refusing to relabel it {:?}",
            region.id,
            stored,
            region.region
        );
    }
    Ok(())
}

/// Make sure type-of-help `id` exists with this label (same rules as regions)
pub fn ensure_type_help(conn: &Connection, type_help: &TypeHelp) -> Result<()> {
    conn.execute(
        "INSERT INTO type_help (id, type_help) VALUES (?1, ?2)
         ON CONFLICT(id) DO NOTHING",
        params![type_help.id, type_help.type_help],
    )?;

    let stored: String = conn.query_row(
        "SELECT type_help FROM type_help WHERE id = ?1",
        [type_help.id],
        |row| row.get(0),
    )?;
    if stored != type_help.type_help {
        bail!(
            "Type of help {} is stored as {:?}, refusing to relabel it {:?}",
            type_help.id,
            stored,
            type_help.type_help
        );
    }
    Ok(())
}

/// Add a new region; the store assigns the id
pub fn create_region(conn: &Connection, region: &str, city: &str) -> Result<Region> {
    conn.execute(
        "INSERT INTO regions (region, city) VALUES (?1, ?2)",
        params![region, city],
    )?;
    Ok(Region {
        id: conn.last_insert_rowid(),
        region: region.to_string(),
        city: city.to_string(),
    })
}

/// Add a new type-of-help category; the store assigns the id
pub fn create_type_help(conn: &Connection, label: &str) -> Result<TypeHelp> {
    conn.execute("INSERT INTO type_help (type_help) VALUES (?1)", [label])?;
    Ok(TypeHelp {
        id: conn.last_insert_rowid(),
        type_help: label.to_string(),
    })
}

pub fn list_regions(conn: &Connection) -> Result<Vec<Region>> {
    let mut stmt = conn.prepare("SELECT id, region, city FROM regions ORDER BY id")?;
    let regions = stmt
        .query_map([], |row| {
            Ok(Region {
                id: row.get(0)?,
                region: row.get(1)?,
                city: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(regions)
}

pub fn list_type_help(conn: &Connection) -> Result<Vec<TypeHelp>> {
    let mut stmt = conn.prepare("SELECT id, type_help FROM type_help ORDER BY id")?;
    let categories = stmt
        .query_map([], |row| {
            Ok(TypeHelp {
                id: row.get(0)?,
                type_help: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

/// Insert a case row with its own id (import path)
///
/// Embedded region/type-help rows are created if missing, never relabelled.
pub fn insert_case(conn: &Connection, case: &Case) -> Result<()> {
    if let Some(type_help) = &case.type_help {
        ensure_type_help(conn, type_help)?;
    }
    if let Some(region) = &case.region {
        ensure_region(conn, region)?;
    }

    conn.execute(
        "INSERT INTO cases (
            id, name, gender, marriage_status, birth_date, national_id, type_help_id, region_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            case.id,
            case.name,
            case.gender,
            case.marriage_status,
            case.birth_date.map(|d| d.format(DATE_FORMAT).to_string()),
            case.national_id,
            case.type_help.as_ref().map(|t| t.id),
            case.region.as_ref().map(|r| r.id),
        ],
    )
    .with_context(|| format!("Failed to insert case {}", case.id))?;

    Ok(())
}

/// Create a case from form input; the store assigns the id
pub fn create_case(conn: &Connection, input: &CaseInput) -> Result<i64> {
    conn.execute(
        "INSERT INTO cases (
            name, gender, marriage_status, birth_date, national_id, type_help_id, region_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            input.name,
            input.gender,
            input.marriage_status,
            input.birth_date.map(|d| d.format(DATE_FORMAT).to_string()),
            input.national_id,
            input.type_help_id,
            input.region_id,
        ],
    )
    .context("Failed to create case")?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite a case's fields; false when no case has that id
pub fn update_case(conn: &Connection, case_id: i64, input: &CaseInput) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE cases
             SET name = ?1, gender = ?2, marriage_status = ?3, birth_date = ?4,
                 national_id = ?5, type_help_id = ?6, region_id = ?7
             WHERE id = ?8",
            params![
                input.name,
                input.gender,
                input.marriage_status,
                input.birth_date.map(|d| d.format(DATE_FORMAT).to_string()),
                input.national_id,
                input.type_help_id,
                input.region_id,
                case_id,
            ],
        )
        .with_context(|| format!("Failed to update case {}", case_id))?;
    Ok(updated > 0)
}

pub fn insert_family_member(conn: &Connection, member: &FamilyMember) -> Result<i64> {
    conn.execute(
        "INSERT INTO family_members (case_id, name, gender, age, qualification, occupation, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            member.case_id,
            member.name,
            member.gender,
            member.age,
            member.qualification,
            member.occupation,
            member.notes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_family_expense(conn: &Connection, expense: &FamilyExpense) -> Result<i64> {
    conn.execute(
        "INSERT INTO family_expenses (case_id, statement, amount, notes) VALUES (?1, ?2, ?3, ?4)",
        params![expense.case_id, expense.statement, expense.amount, expense.notes],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_family_income(conn: &Connection, income: &FamilyIncome) -> Result<i64> {
    conn.execute(
        "INSERT INTO family_income (case_id, source_name, amount) VALUES (?1, ?2, ?3)",
        params![income.case_id, income.source_name, income.amount],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_medical_expense(conn: &Connection, medical: &MedicalExpense) -> Result<i64> {
    conn.execute(
        "INSERT INTO medical_expenses (case_id, full_name, disease_type, medicine, insurance_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            medical.case_id,
            medical.full_name,
            medical.disease_type,
            medical.medicine,
            medical.insurance_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_note(conn: &Connection, note: &Note) -> Result<i64> {
    conn.execute(
        "INSERT INTO notes (
            case_id, note_header, human_needs, other_help, interview_description,
            interview_result, researcher_opinion, supervisor_opinion, overall_rating
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            note.case_id,
            note.note_header,
            note.human_needs,
            note.other_help,
            note.interview_description,
            note.interview_result,
            note.researcher_opinion,
            note.supervisor_opinion,
            note.overall_rating,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ============================================================================
// Child updates and deletes (scoped to the owning case)
// ============================================================================

pub fn update_family_member(
    conn: &Connection,
    case_id: i64,
    member_id: i64,
    member: &FamilyMember,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE family_members
         SET name = ?1, gender = ?2, age = ?3, qualification = ?4, occupation = ?5, notes = ?6
         WHERE id = ?7 AND case_id = ?8",
        params![
            member.name,
            member.gender,
            member.age,
            member.qualification,
            member.occupation,
            member.notes,
            member_id,
            case_id,
        ],
    )?;
    Ok(updated > 0)
}

pub fn update_family_expense(
    conn: &Connection,
    case_id: i64,
    expense_id: i64,
    expense: &FamilyExpense,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE family_expenses SET statement = ?1, amount = ?2, notes = ?3
         WHERE id = ?4 AND case_id = ?5",
        params![expense.statement, expense.amount, expense.notes, expense_id, case_id],
    )?;
    Ok(updated > 0)
}

pub fn update_family_income(
    conn: &Connection,
    case_id: i64,
    income_id: i64,
    income: &FamilyIncome,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE family_income SET source_name = ?1, amount = ?2
         WHERE id = ?3 AND case_id = ?4",
        params![income.source_name, income.amount, income_id, case_id],
    )?;
    Ok(updated > 0)
}

pub fn update_medical_expense(
    conn: &Connection,
    case_id: i64,
    medical_id: i64,
    medical: &MedicalExpense,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE medical_expenses
         SET full_name = ?1, disease_type = ?2, medicine = ?3, insurance_id = ?4
         WHERE id = ?5 AND case_id = ?6",
        params![
            medical.full_name,
            medical.disease_type,
            medical.medicine,
            medical.insurance_id,
            medical_id,
            case_id,
        ],
    )?;
    Ok(updated > 0)
}

pub fn update_note(conn: &Connection, case_id: i64, note_id: i64, note: &Note) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE notes
         SET note_header = ?1, human_needs = ?2, other_help = ?3, interview_description = ?4,
             interview_result = ?5, researcher_opinion = ?6, supervisor_opinion = ?7,
             overall_rating = ?8
         WHERE id = ?9 AND case_id = ?10",
        params![
            note.note_header,
            note.human_needs,
            note.other_help,
            note.interview_description,
            note.interview_result,
            note.researcher_opinion,
            note.supervisor_opinion,
            note.overall_rating,
            note_id,
            case_id,
        ],
    )?;
    Ok(updated > 0)
}

/// `table` is always one of the fixed child table names below
fn delete_child_row(conn: &Connection, table: &str, case_id: i64, id: i64) -> Result<bool> {
    let deleted = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1 AND case_id = ?2", table),
        params![id, case_id],
    )?;
    Ok(deleted > 0)
}

pub fn delete_family_member(conn: &Connection, case_id: i64, member_id: i64) -> Result<bool> {
    delete_child_row(conn, "family_members", case_id, member_id)
}

pub fn delete_family_expense(conn: &Connection, case_id: i64, expense_id: i64) -> Result<bool> {
    delete_child_row(conn, "family_expenses", case_id, expense_id)
}

pub fn delete_family_income(conn: &Connection, case_id: i64, income_id: i64) -> Result<bool> {
    delete_child_row(conn, "family_income", case_id, income_id)
}

pub fn delete_medical_expense(conn: &Connection, case_id: i64, medical_id: i64) -> Result<bool> {
    delete_child_row(conn, "medical_expenses", case_id, medical_id)
}

pub fn delete_note(conn: &Connection, case_id: i64, note_id: i64) -> Result<bool> {
    delete_child_row(conn, "notes", case_id, note_id)
}

// ============================================================================
// ChildRecord - one interface over the five child tables
// ============================================================================

/// Storage operations shared by every child collection
pub trait ChildRecord: Sized {
    /// Re-point the record at its owning case
    fn set_case_id(&mut self, case_id: i64);
    fn insert(&self, conn: &Connection) -> Result<i64>;
    fn update(&self, conn: &Connection, case_id: i64, id: i64) -> Result<bool>;
    fn delete(conn: &Connection, case_id: i64, id: i64) -> Result<bool>;
}

impl ChildRecord for FamilyMember {
    fn set_case_id(&mut self, case_id: i64) {
        self.case_id = case_id;
    }
    fn insert(&self, conn: &Connection) -> Result<i64> {
        insert_family_member(conn, self)
    }
    fn update(&self, conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        update_family_member(conn, case_id, id, self)
    }
    fn delete(conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        delete_family_member(conn, case_id, id)
    }
}

impl ChildRecord for FamilyExpense {
    fn set_case_id(&mut self, case_id: i64) {
        self.case_id = case_id;
    }
    fn insert(&self, conn: &Connection) -> Result<i64> {
        insert_family_expense(conn, self)
    }
    fn update(&self, conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        update_family_expense(conn, case_id, id, self)
    }
    fn delete(conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        delete_family_expense(conn, case_id, id)
    }
}

impl ChildRecord for FamilyIncome {
    fn set_case_id(&mut self, case_id: i64) {
        self.case_id = case_id;
    }
    fn insert(&self, conn: &Connection) -> Result<i64> {
        insert_family_income(conn, self)
    }
    fn update(&self, conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        update_family_income(conn, case_id, id, self)
    }
    fn delete(conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        delete_family_income(conn, case_id, id)
    }
}

impl ChildRecord for MedicalExpense {
    fn set_case_id(&mut self, case_id: i64) {
        self.case_id = case_id;
    }
    fn insert(&self, conn: &Connection) -> Result<i64> {
        insert_medical_expense(conn, self)
    }
    fn update(&self, conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        update_medical_expense(conn, case_id, id, self)
    }
    fn delete(conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        delete_medical_expense(conn, case_id, id)
    }
}

impl ChildRecord for Note {
    fn set_case_id(&mut self, case_id: i64) {
        self.case_id = case_id;
    }
    fn insert(&self, conn: &Connection) -> Result<i64> {
        insert_note(conn, self)
    }
    fn update(&self, conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        update_note(conn, case_id, id, self)
    }
    fn delete(conn: &Connection, case_id: i64, id: i64) -> Result<bool> {
        delete_note(conn, case_id, id)
    }
}

/// Insert a case and all of its children in one transaction
///
/// Children are re-pointed at the aggregate's case before insert.
pub fn insert_aggregate(conn: &Connection, aggregate: &CaseAggregate) -> Result<()> {
    let mut aggregate = aggregate.clone();
    aggregate.adopt_children();

    let tx = conn.unchecked_transaction()?;

    insert_case(&tx, &aggregate.case)?;
    for member in &aggregate.family_members {
        insert_family_member(&tx, member)?;
    }
    for expense in &aggregate.family_expenses {
        insert_family_expense(&tx, expense)?;
    }
    for income in &aggregate.family_income {
        insert_family_income(&tx, income)?;
    }
    for medical in &aggregate.medical_expenses {
        insert_medical_expense(&tx, medical)?;
    }
    for note in &aggregate.notes {
        insert_note(&tx, note)?;
    }

    tx.commit()?;
    Ok(())
}

/// Load aggregates from a JSON array file (import format)
pub fn load_json(json_path: &Path) -> Result<Vec<CaseAggregate>> {
    let content = fs::read_to_string(json_path)
        .with_context(|| format!("Failed to open {}", json_path.display()))?;

    let aggregates: Vec<CaseAggregate> =
        serde_json::from_str(&content).context("Failed to deserialize cases")?;

    Ok(aggregates)
}

/// Delete a case; children go with it (ON DELETE CASCADE)
pub fn delete_case(conn: &Connection, case_id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM cases WHERE id = ?1", [case_id])?;
    Ok(deleted > 0)
}

// ============================================================================
// Queries
// ============================================================================

const CASE_SELECT: &str = "SELECT c.id, c.name, c.gender, c.marriage_status, c.birth_date,
            c.national_id, t.id, t.type_help, r.id, r.region, r.city
     FROM cases c
     LEFT JOIN type_help t ON t.id = c.type_help_id
     LEFT JOIN regions r ON r.id = c.region_id";

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<Case> {
    let birth_date_str: Option<String> = row.get(4)?;
    let birth_date = match birth_date_str {
        Some(s) => Some(NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    let type_help_id: Option<i64> = row.get(6)?;
    let type_help = match type_help_id {
        Some(id) => Some(TypeHelp {
            id,
            type_help: row.get(7)?,
        }),
        None => None,
    };

    let region_id: Option<i64> = row.get(8)?;
    let region = match region_id {
        Some(id) => Some(Region {
            id,
            region: row.get(9)?,
            city: row.get(10)?,
        }),
        None => None,
    };

    Ok(Case {
        id: row.get(0)?,
        name: row.get(1)?,
        gender: row.get(2)?,
        marriage_status: row.get(3)?,
        birth_date,
        national_id: row.get(5)?,
        type_help,
        region,
    })
}

pub fn get_case(conn: &Connection, case_id: i64) -> Result<Option<Case>> {
    let case = conn
        .query_row(
            &format!("{} WHERE c.id = ?1", CASE_SELECT),
            [case_id],
            case_from_row,
        )
        .optional()?;
    Ok(case)
}

/// All cases in id order
pub fn list_cases(conn: &Connection) -> Result<Vec<Case>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY c.id", CASE_SELECT))?;
    let cases = stmt
        .query_map([], case_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cases)
}

/// Escape LIKE wildcards so the query only matches literally
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Case-insensitive substring search on name; no query means no results
pub fn search_cases(conn: &Connection, query: Option<&str>) -> Result<Vec<Case>> {
    let query = match query.map(str::trim) {
        Some(q) if !q.is_empty() => q,
        _ => return Ok(Vec::new()),
    };

    let mut stmt = conn.prepare(&format!(
        "{} WHERE lower(c.name) LIKE '%' || lower(?1) || '%' ESCAPE '\\' ORDER BY c.id",
        CASE_SELECT
    ))?;
    let cases = stmt
        .query_map([escape_like(query)], case_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cases)
}

pub fn count_cases(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))?;
    Ok(count)
}

fn get_family_members(conn: &Connection, case_id: i64) -> Result<Vec<FamilyMember>> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, name, gender, age, qualification, occupation, notes
         FROM family_members WHERE case_id = ?1 ORDER BY id",
    )?;
    let members = stmt
        .query_map([case_id], |row| {
            Ok(FamilyMember {
                id: row.get(0)?,
                case_id: row.get(1)?,
                name: row.get(2)?,
                gender: row.get(3)?,
                age: row.get(4)?,
                qualification: row.get(5)?,
                occupation: row.get(6)?,
                notes: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

fn get_family_expenses(conn: &Connection, case_id: i64) -> Result<Vec<FamilyExpense>> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, statement, amount, notes
         FROM family_expenses WHERE case_id = ?1 ORDER BY id",
    )?;
    let expenses = stmt
        .query_map([case_id], |row| {
            Ok(FamilyExpense {
                id: row.get(0)?,
                case_id: row.get(1)?,
                statement: row.get(2)?,
                amount: row.get(3)?,
                notes: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(expenses)
}

fn get_family_income(conn: &Connection, case_id: i64) -> Result<Vec<FamilyIncome>> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, source_name, amount
         FROM family_income WHERE case_id = ?1 ORDER BY id",
    )?;
    let income = stmt
        .query_map([case_id], |row| {
            Ok(FamilyIncome {
                id: row.get(0)?,
                case_id: row.get(1)?,
                source_name: row.get(2)?,
                amount: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(income)
}

fn get_medical_expenses(conn: &Connection, case_id: i64) -> Result<Vec<MedicalExpense>> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, full_name, disease_type, medicine, insurance_id
         FROM medical_expenses WHERE case_id = ?1 ORDER BY id",
    )?;
    let medical = stmt
        .query_map([case_id], |row| {
            Ok(MedicalExpense {
                id: row.get(0)?,
                case_id: row.get(1)?,
                full_name: row.get(2)?,
                disease_type: row.get(3)?,
                medicine: row.get(4)?,
                insurance_id: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(medical)
}

fn get_notes(conn: &Connection, case_id: i64) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, note_header, human_needs, other_help, interview_description,
                interview_result, researcher_opinion, supervisor_opinion, overall_rating
         FROM notes WHERE case_id = ?1 ORDER BY id",
    )?;
    let notes = stmt
        .query_map([case_id], |row| {
            Ok(Note {
                id: row.get(0)?,
                case_id: row.get(1)?,
                note_header: row.get(2)?,
                human_needs: row.get(3)?,
                other_help: row.get(4)?,
                interview_description: row.get(5)?,
                interview_result: row.get(6)?,
                researcher_opinion: row.get(7)?,
                supervisor_opinion: row.get(8)?,
                overall_rating: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notes)
}

fn load_children(conn: &Connection, case: Case) -> Result<CaseAggregate> {
    let case_id = case.id;
    let mut aggregate = CaseAggregate::new(case);

    aggregate.family_members = get_family_members(conn, case_id)?;
    aggregate.family_expenses = get_family_expenses(conn, case_id)?;
    aggregate.family_income = get_family_income(conn, case_id)?;
    aggregate.medical_expenses = get_medical_expenses(conn, case_id)?;
    aggregate.notes = get_notes(conn, case_id)?;

    debug!(case_id, children = aggregate.child_count(), "loaded case aggregate");
    Ok(aggregate)
}

/// A case with all five child collections, or None if the id is unknown
pub fn get_case_aggregate(conn: &Connection, case_id: i64) -> Result<Option<CaseAggregate>> {
    match get_case(conn, case_id)? {
        Some(case) => Ok(Some(load_children(conn, case)?)),
        None => Ok(None),
    }
}

/// Every case aggregate, in id order
pub fn get_all_case_aggregates(conn: &Connection) -> Result<Vec<CaseAggregate>> {
    list_cases(conn)?
        .into_iter()
        .map(|case| load_children(conn, case))
        .collect()
}

impl CaseSource for Connection {
    fn find_case(&self, case_id: i64) -> Result<Option<CaseAggregate>> {
        get_case_aggregate(self, case_id)
    }

    fn all_cases(&self) -> Result<Vec<CaseAggregate>> {
        get_all_case_aggregates(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create a test aggregate with one record per collection
    fn create_test_aggregate(id: i64, name: &str) -> CaseAggregate {
        let mut case = Case::new(id, name, Gender::Female, MarriageStatus::Married);
        case.birth_date = NaiveDate::from_ymd_opt(1985, 4, 12);
        case.national_id = format!("NID-{}", id);

        let mut aggregate = CaseAggregate::new(case);
        aggregate
            .family_members
            .push(FamilyMember::new(id, "Omar", Gender::Male, 10));
        aggregate
            .family_expenses
            .push(FamilyExpense::new(id, "Rent", 250.0));
        aggregate
            .family_income
            .push(FamilyIncome::new(id, "Salary", 500.0));
        aggregate
            .medical_expenses
            .push(MedicalExpense::new(id, "Omar Ali", "Asthma", "Inhaler"));
        aggregate.notes.push(Note::new(id, "First visit", 4));
        aggregate
    }

    fn open_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_aggregate_round_trip() {
        let conn = open_test_db();
        let mut original = create_test_aggregate(1, "Sara Ali");
        original.case.region = Some(Region {
            id: 3,
            region: "North".to_string(),
            city: "Irbid".to_string(),
        });

        insert_aggregate(&conn, &original).unwrap();

        let loaded = get_case_aggregate(&conn, 1).unwrap().unwrap();
        assert_eq!(loaded.case, original.case);
        assert_eq!(loaded.child_count(), 5);
        assert_eq!(loaded.family_members[0].name, "Omar");
        assert_eq!(loaded.family_members[0].gender, Gender::Male);
        assert_eq!(loaded.family_income[0].amount, 500.0);
        assert_eq!(loaded.notes[0].overall_rating, 4);
        assert!(loaded.family_members[0].id > 0);
    }

    #[test]
    fn test_missing_case_is_none() {
        let conn = open_test_db();
        assert!(get_case_aggregate(&conn, 404).unwrap().is_none());
        assert!(conn.find_case(404).unwrap().is_none());
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let conn = open_test_db();
        let mut aggregate = create_test_aggregate(1, "Sara Ali");
        aggregate
            .family_members
            .push(FamilyMember::new(1, "Lina", Gender::Female, 4));
        aggregate
            .family_members
            .push(FamilyMember::new(1, "Adam", Gender::Male, 2));
        insert_aggregate(&conn, &aggregate).unwrap();

        let loaded = get_case_aggregate(&conn, 1).unwrap().unwrap();
        let names: Vec<&str> = loaded.family_members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Omar", "Lina", "Adam"]);
    }

    #[test]
    fn test_children_do_not_leak_between_cases() {
        let conn = open_test_db();
        insert_aggregate(&conn, &create_test_aggregate(1, "Sara Ali")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(2, "Huda Saleh")).unwrap();

        let all = conn.all_cases().unwrap();
        assert_eq!(all.len(), 2);
        for aggregate in &all {
            assert!(aggregate.family_members.iter().all(|m| m.case_id == aggregate.id()));
            assert!(aggregate.notes.iter().all(|n| n.case_id == aggregate.id()));
            assert_eq!(aggregate.child_count(), 5);
        }
    }

    #[test]
    fn test_search_cases() {
        let conn = open_test_db();
        insert_aggregate(&conn, &create_test_aggregate(1, "Sara Ali")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(2, "Huda Saleh")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(3, "Ali Hassan")).unwrap();

        let found = search_cases(&conn, Some("ali")).unwrap();
        let ids: Vec<i64> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);

        // Absent or blank query returns nothing, not everything
        assert!(search_cases(&conn, None).unwrap().is_empty());
        assert!(search_cases(&conn, Some("   ")).unwrap().is_empty());
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let conn = open_test_db();
        insert_aggregate(&conn, &create_test_aggregate(1, "Sara Ali")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(2, "A_B")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(3, "50% Aid")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(4, "Back\\slash")).unwrap();

        let ids = |q: &str| -> Vec<i64> {
            search_cases(&conn, Some(q)).unwrap().iter().map(|c| c.id).collect()
        };

        assert_eq!(ids("%"), vec![3]);
        assert_eq!(ids("_"), vec![2]);
        assert_eq!(ids("a_b"), vec![2]);
        assert_eq!(ids("\\"), vec![4]);
        assert!(ids("%%").is_empty());
    }

    #[test]
    fn test_import_keeps_existing_region_label() {
        let conn = open_test_db();
        let north = Region {
            id: 3,
            region: "North".to_string(),
            city: "Irbid".to_string(),
        };

        let mut first = create_test_aggregate(1, "Sara Ali");
        first.case.region = Some(north.clone());
        insert_aggregate(&conn, &first).unwrap();

        // Same id and label is fine
        let mut second = create_test_aggregate(2, "Huda Saleh");
        second.case.region = Some(north.clone());
        insert_aggregate(&conn, &second).unwrap();

        // Same id, different label is refused and nothing is rewritten
        let mut third = create_test_aggregate(4, "Ali Hassan");
        third.case.region = Some(Region {
            id: 3,
            region: "South".to_string(),
            city: "Aqaba".to_string(),
        });
        assert!(insert_aggregate(&conn, &third).is_err());
        assert!(get_case(&conn, 4).unwrap().is_none());

        let stored = get_case(&conn, 1).unwrap().unwrap();
        assert_eq!(stored.region, Some(north));
    }

    #[test]
    fn test_import_keeps_existing_type_help_label() {
        let conn = open_test_db();
        let food = TypeHelp {
            id: 2,
            type_help: "Food".to_string(),
        };
        ensure_type_help(&conn, &food).unwrap();
        ensure_type_help(&conn, &food).unwrap();

        let renamed = TypeHelp {
            id: 2,
            type_help: "Cash".to_string(),
        };
        assert!(ensure_type_help(&conn, &renamed).is_err());
        assert_eq!(list_type_help(&conn).unwrap(), vec![food]);
    }

    #[test]
    fn test_create_region_and_type_help() {
        let conn = open_test_db();
        let north = create_region(&conn, "North", "Irbid").unwrap();
        let south = create_region(&conn, "South", "Aqaba").unwrap();
        assert!(south.id > north.id);
        assert_eq!(list_regions(&conn).unwrap(), vec![north, south]);

        let food = create_type_help(&conn, "Food").unwrap();
        assert_eq!(list_type_help(&conn).unwrap(), vec![food]);
    }

    #[test]
    fn test_create_and_update_case() {
        let conn = open_test_db();
        let region = create_region(&conn, "North", "Irbid").unwrap();

        let mut input = CaseInput {
            name: "Sara Ali".to_string(),
            gender: Gender::Female,
            marriage_status: MarriageStatus::Single,
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 2),
            national_id: "NID-1".to_string(),
            type_help_id: None,
            region_id: Some(region.id),
        };
        let id = create_case(&conn, &input).unwrap();

        let created = get_case(&conn, id).unwrap().unwrap();
        assert_eq!(created.name, "Sara Ali");
        assert_eq!(created.region, Some(region));

        input.marriage_status = MarriageStatus::Married;
        input.region_id = None;
        assert!(update_case(&conn, id, &input).unwrap());
        assert!(!update_case(&conn, id + 100, &input).unwrap());

        let updated = get_case(&conn, id).unwrap().unwrap();
        assert_eq!(updated.marriage_status, MarriageStatus::Married);
        assert_eq!(updated.region, None);
        assert_eq!(CaseInput::from(&updated), input);
    }

    #[test]
    fn test_update_and_delete_children_are_scoped_to_case() {
        let conn = open_test_db();
        insert_aggregate(&conn, &create_test_aggregate(1, "Sara Ali")).unwrap();
        insert_aggregate(&conn, &create_test_aggregate(2, "Huda Saleh")).unwrap();

        let loaded = get_case_aggregate(&conn, 1).unwrap().unwrap();
        let member_id = loaded.family_members[0].id;
        let income_id = loaded.family_income[0].id;

        let mut member = loaded.family_members[0].clone();
        member.age = 11;
        member.occupation = "Student".to_string();

        // Wrong owner touches nothing
        assert!(!update_family_member(&conn, 2, member_id, &member).unwrap());
        assert!(!delete_family_income(&conn, 2, income_id).unwrap());

        assert!(update_family_member(&conn, 1, member_id, &member).unwrap());
        assert!(delete_family_income(&conn, 1, income_id).unwrap());

        let reloaded = get_case_aggregate(&conn, 1).unwrap().unwrap();
        assert_eq!(reloaded.family_members[0].age, 11);
        assert_eq!(reloaded.family_members[0].occupation, "Student");
        assert!(reloaded.family_income.is_empty());

        let other = get_case_aggregate(&conn, 2).unwrap().unwrap();
        assert_eq!(other.child_count(), 5);
    }

    #[test]
    fn test_child_record_covers_every_collection() {
        let conn = open_test_db();
        insert_aggregate(&conn, &CaseAggregate::new(Case::new(
            1,
            "Sara Ali",
            Gender::Female,
            MarriageStatus::Married,
        )))
        .unwrap();

        fn cycle<T: ChildRecord>(conn: &Connection, mut record: T, edit: impl Fn(&mut T)) {
            record.set_case_id(1);
            let id = record.insert(conn).unwrap();
            edit(&mut record);
            assert!(record.update(conn, 1, id).unwrap());
            assert!(T::delete(conn, 1, id).unwrap());
            assert!(!T::delete(conn, 1, id).unwrap());
        }

        cycle(&conn, FamilyMember::new(0, "Omar", Gender::Male, 10), |m| m.age = 12);
        cycle(&conn, FamilyExpense::new(0, "Rent", 250.0), |e| e.amount = 300.0);
        cycle(&conn, FamilyIncome::new(0, "Salary", 500.0), |i| i.amount = 550.0);
        cycle(&conn, MedicalExpense::new(0, "Omar", "Asthma", "Inhaler"), |m| {
            m.insurance_id = "INS-9".to_string()
        });
        cycle(&conn, Note::new(0, "Visit", 3), |n| n.overall_rating = 5);

        assert_eq!(get_case_aggregate(&conn, 1).unwrap().unwrap().child_count(), 0);
    }

    #[test]
    fn test_update_note_fields() {
        let conn = open_test_db();
        insert_aggregate(&conn, &create_test_aggregate(1, "Sara Ali")).unwrap();
        let mut note = get_case_aggregate(&conn, 1).unwrap().unwrap().notes[0].clone();

        note.supervisor_opinion = "Approve".to_string();
        note.overall_rating = 5;
        assert!(update_note(&conn, 1, note.id, &note).unwrap());

        let reloaded = get_case_aggregate(&conn, 1).unwrap().unwrap();
        assert_eq!(reloaded.notes, vec![note]);
    }

    #[test]
    fn test_delete_cascades_to_children() {
        let conn = open_test_db();
        insert_aggregate(&conn, &create_test_aggregate(1, "Sara Ali")).unwrap();

        assert!(delete_case(&conn, 1).unwrap());
        assert!(!delete_case(&conn, 1).unwrap());
        assert_eq!(count_cases(&conn).unwrap(), 0);

        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM family_members", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_child_for_unknown_case_is_rejected() {
        let conn = open_test_db();
        let result = insert_family_income(&conn, &FamilyIncome::new(77, "Salary", 10.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_stored_code_fails_to_load() {
        let conn = open_test_db();
        conn.execute(
            "INSERT INTO cases (id, name, gender, marriage_status) VALUES (1, 'Bad', 'X', 'S')",
            [],
        )
        .unwrap();

        assert!(get_case(&conn, 1).is_err());
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[{
                "case": {"id": 5, "name": "Sara Ali", "gender": "F", "marriage_status": "M",
                         "birth_date": "1985-04-12"},
                "family_income": [{"source_name": "Salary", "amount": 500.0}]
            }]"#,
        )
        .unwrap();

        let aggregates = load_json(&path).unwrap();
        assert_eq!(aggregates.len(), 1);

        let conn = open_test_db();
        insert_aggregate(&conn, &aggregates[0]).unwrap();

        // case_id was omitted in the file; insert adopts the children
        let loaded = get_case_aggregate(&conn, 5).unwrap().unwrap();
        assert_eq!(loaded.family_income.len(), 1);
        assert_eq!(loaded.family_income[0].case_id, 5);
        assert_eq!(loaded.case.birth_date, NaiveDate::from_ymd_opt(1985, 4, 12));
    }
}
