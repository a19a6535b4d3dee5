//! Reporting statistics repository: aggregate read models over `print_events`.
//!
//! Time bounds are inclusive and use the storage timestamp format, so plain
//! string comparison against `print_events.timestamp` is a time comparison.
//! Every aggregate only returns rows with a non-zero page sum.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Totals and a per-day series since a point in time.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_pages: i64,
    pub total_documents: i64,
    pub daily: Vec<DailyPoint>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub pages: i64,
    pub documents: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentTotal {
    pub code: String,
    pub name: String,
    pub pages: i64,
    pub documents: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserTotal {
    pub username: String,
    pub fio: String,
    pub pages: i64,
    pub documents: i64,
}

/// One leaf of the department → model → room → printer → user → document
/// usage tree.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageTreeRow {
    pub department_code: String,
    pub model_code: String,
    pub room_number: String,
    pub printer_index: i64,
    pub username: String,
    pub fio: String,
    pub document_name: String,
    pub pages: i64,
    pub last_time: String,
}

/// Dashboard totals and daily series for events at or after `since`.
pub fn dashboard(db: &Database, since: &str) -> Result<Dashboard, DatabaseError> {
    db.with_conn(|conn| {
        let (total_pages, total_documents): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(pages), 0), COUNT(*) FROM print_events WHERE timestamp >= ?1",
            params![since],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT substr(timestamp, 1, 10) AS day, SUM(pages), COUNT(*)
             FROM print_events WHERE timestamp >= ?1
             GROUP BY day HAVING SUM(pages) > 0 ORDER BY day",
        )?;
        let daily = stmt
            .query_map(params![since], |row| {
                Ok(DailyPoint {
                    date: row.get(0)?,
                    pages: row.get(1)?,
                    documents: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dashboard {
            total_pages,
            total_documents,
            daily,
        })
    })
}

/// Page and document totals per department (of the printer), largest first.
pub fn department_totals(
    db: &Database,
    from: &str,
    to: &str,
) -> Result<Vec<DepartmentTotal>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT d.code, d.name, SUM(e.pages) AS pages, COUNT(e.id) AS documents
             FROM print_events e
             JOIN printers p ON p.id = e.printer_id
             JOIN departments d ON d.id = p.department_id
             WHERE e.timestamp >= ?1 AND e.timestamp <= ?2
             GROUP BY d.id HAVING SUM(e.pages) > 0
             ORDER BY pages DESC, d.code",
        )?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok(DepartmentTotal {
                    code: row.get(0)?,
                    name: row.get(1)?,
                    pages: row.get(2)?,
                    documents: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// The `limit` users with the most printed pages in the range.
pub fn top_users(
    db: &Database,
    from: &str,
    to: &str,
    limit: u32,
) -> Result<Vec<UserTotal>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT u.username, u.fio, SUM(e.pages) AS pages, COUNT(e.id) AS documents
             FROM print_events e
             JOIN users u ON u.id = e.user_id
             WHERE e.timestamp >= ?1 AND e.timestamp <= ?2
             GROUP BY u.id HAVING SUM(e.pages) > 0
             ORDER BY pages DESC, u.username
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![from, to, limit], |row| {
                Ok(UserTotal {
                    username: row.get(0)?,
                    fio: row.get(1)?,
                    pages: row.get(2)?,
                    documents: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Flat usage tree rows, ordered so a caller can fold them into nested
/// groups in one pass.
pub fn usage_tree(db: &Database, from: &str, to: &str) -> Result<Vec<UsageTreeRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT d.code, m.code, p.room_number, p.printer_index, u.username, u.fio,
                    e.document_name, SUM(e.pages) AS pages, MAX(e.timestamp) AS last_time
             FROM print_events e
             JOIN printers p ON p.id = e.printer_id
             JOIN departments d ON d.id = p.department_id
             JOIN printer_models m ON m.id = p.model_id
             JOIN users u ON u.id = e.user_id
             WHERE e.timestamp >= ?1 AND e.timestamp <= ?2
             GROUP BY d.id, m.id, p.room_number, p.printer_index, u.id, e.document_name
             HAVING SUM(e.pages) > 0
             ORDER BY d.code, m.code, p.room_number, p.printer_index, u.username, e.document_name",
        )?;
        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok(UsageTreeRow {
                    department_code: row.get(0)?,
                    model_code: row.get(1)?,
                    room_number: row.get(2)?,
                    printer_index: row.get(3)?,
                    username: row.get(4)?,
                    fio: row.get(5)?,
                    document_name: row.get(6)?,
                    pages: row.get(7)?,
                    last_time: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
