//! Print event repository: the `print_events` fact table.

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::{now_timestamp, Database, DatabaseError};

/// SQLite's default host-parameter limit is 999; stay well below it.
const IN_CLAUSE_CHUNK: usize = 500;

/// A raw print event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintEventRow {
    pub id: i64,
    pub document_id: i64,
    pub document_name: String,
    pub job_id: String,
    pub timestamp: String,
    pub byte_size: i64,
    pub pages: i64,
    pub user_id: i64,
    pub printer_id: i64,
    pub computer_id: Option<i64>,
    pub port_id: Option<i64>,
    pub created_at: String,
}

impl PrintEventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            document_name: row.get("document_name")?,
            job_id: row.get("job_id")?,
            timestamp: row.get("timestamp")?,
            byte_size: row.get("byte_size")?,
            pages: row.get("pages")?,
            user_id: row.get("user_id")?,
            printer_id: row.get("printer_id")?,
            computer_id: row.get("computer_id")?,
            port_id: row.get("port_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Values for a new fact row. Events are never updated after insert.
#[derive(Debug, Clone)]
pub struct NewPrintEvent<'a> {
    pub document_id: i64,
    pub document_name: &'a str,
    pub job_id: &'a str,
    pub timestamp: &'a str,
    pub byte_size: i64,
    pub pages: i64,
    pub user_id: i64,
    pub printer_id: i64,
    pub computer_id: Option<i64>,
    pub port_id: Option<i64>,
}

/// Returns the subset of `job_ids` already stored.
pub fn find_existing_job_ids(
    conn: &Connection,
    job_ids: &[String],
) -> Result<HashSet<String>, DatabaseError> {
    let mut existing = HashSet::new();

    for chunk in job_ids.chunks(IN_CLAUSE_CHUNK) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT job_id FROM print_events WHERE job_id IN ({})",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let found = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        existing.extend(found);
    }

    Ok(existing)
}

/// Inserts a fact row and returns its id. A duplicate `job_id` surfaces as
/// a unique-constraint error (see [`DatabaseError::is_unique_violation`]).
pub fn insert(conn: &Connection, event: &NewPrintEvent<'_>) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO print_events (document_id, document_name, job_id, timestamp, byte_size,
         pages, user_id, printer_id, computer_id, port_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            event.document_id,
            event.document_name,
            event.job_id,
            event.timestamp,
            event.byte_size,
            event.pages,
            event.user_id,
            event.printer_id,
            event.computer_id,
            event.port_id,
            now_timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds an event by its job id.
pub fn find_by_job_id(conn: &Connection, job_id: &str) -> Result<Option<PrintEventRow>, DatabaseError> {
    let mut stmt = conn.prepare_cached("SELECT * FROM print_events WHERE job_id = ?1")?;
    let mut rows = stmt.query_map(params![job_id], PrintEventRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Query filter parameters for the event list.
#[derive(Debug, Default, Clone)]
pub struct EventFilter {
    /// Inclusive lower bound, storage format (see [`super::format_timestamp`]).
    pub from: Option<String>,
    /// Inclusive upper bound, storage format.
    pub to: Option<String>,
    pub username: Option<String>,
    pub department_code: Option<String>,
    pub printer_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// One row of the filtered event list, joined with its dimensions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintEventView {
    pub id: i64,
    pub job_id: String,
    pub timestamp: String,
    pub document_name: String,
    pub pages: i64,
    pub byte_size: i64,
    pub username: String,
    pub fio: String,
    pub printer_name: String,
    pub department_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
}

/// Queries events with filters, newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &EventFilter) -> Result<(Vec<PrintEventView>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref from) = filter.from {
            conditions.push(format!("e.timestamp >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.clone()));
        }
        if let Some(ref to) = filter.to {
            conditions.push(format!("e.timestamp <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.clone()));
        }
        if let Some(ref username) = filter.username {
            conditions.push(format!("u.username = ?{}", param_values.len() + 1));
            param_values.push(Box::new(username.clone()));
        }
        if let Some(ref code) = filter.department_code {
            conditions.push(format!("d.code = ?{}", param_values.len() + 1));
            param_values.push(Box::new(code.clone()));
        }
        if let Some(printer_id) = filter.printer_id {
            conditions.push(format!("e.printer_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(printer_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let from_clause = "FROM print_events e
             JOIN users u ON u.id = e.user_id
             JOIN printers p ON p.id = e.printer_id
             JOIN departments d ON d.id = p.department_id
             LEFT JOIN computers c ON c.id = e.computer_id
             LEFT JOIN ports pt ON pt.id = e.port_id";

        let count_sql = format!("SELECT COUNT(*) {} {}", from_clause, where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(50) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT e.id, e.job_id, e.timestamp, e.document_name, e.pages, e.byte_size,
             u.username, u.fio, p.name AS printer_name, d.code AS department_code,
             c.name AS computer_name, pt.name AS port_name
             {} {} ORDER BY e.timestamp DESC, e.id DESC LIMIT ?{} OFFSET ?{}",
            from_clause,
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<PrintEventView> = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(PrintEventView {
                    id: row.get("id")?,
                    job_id: row.get("job_id")?,
                    timestamp: row.get("timestamp")?,
                    document_name: row.get("document_name")?,
                    pages: row.get("pages")?,
                    byte_size: row.get("byte_size")?,
                    username: row.get("username")?,
                    fio: row.get("fio")?,
                    printer_name: row.get("printer_name")?,
                    department_code: row.get("department_code")?,
                    computer_name: row.get("computer_name")?,
                    port_name: row.get("port_name")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}
