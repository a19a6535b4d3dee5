//! User roster import from the directory-service CSV export.
//!
//! Each row commits on its own, so an interrupted import keeps every row
//! processed before the interruption.

use std::io::Read;

use tracing::info_span;

use super::error::{RosterFileError, RosterRowError};
use super::report::ImportReport;
use super::resolver::IdentityResolver;
use super::roster::{RosterEntry, RosterRow, REQUIRED_COLUMNS};
use crate::db::{user_repo, Database};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Created,
    Updated,
}

pub struct RosterImporter {
    db: Database,
}

impl RosterImporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn import_reader<R: Read>(&self, mut reader: R) -> ImportReport {
        let mut content = Vec::new();
        if let Err(e) = reader.read_to_end(&mut content) {
            let mut report = ImportReport::default();
            report.push_error(format!("File reading error: {}", e));
            return report;
        }
        self.import_csv(&content)
    }

    /// Imports a roster file, reporting file-level failures in the report.
    pub fn import_csv(&self, content: &[u8]) -> ImportReport {
        self.try_import_csv(content).unwrap_or_else(|e| {
            log::error!("Roster file rejected: {}", e);
            let mut report = ImportReport::default();
            report.push_error(format!("File reading error: {}", e));
            report
        })
    }

    /// Imports a roster file. Row-level failures land in the report; a file
    /// that cannot be decoded or lacks a required column is an `Err` and
    /// nothing is imported. An empty file imports nothing and is not an error.
    pub fn try_import_csv(&self, content: &[u8]) -> Result<ImportReport, RosterFileError> {
        let run_id = uuid::Uuid::new_v4();
        let _span = info_span!("import_users", run_id = %run_id, bytes = content.len()).entered();

        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
        let text = std::str::from_utf8(content)?;
        if text.trim().is_empty() {
            log::info!("Roster file is empty, nothing to import");
            return Ok(ImportReport::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        if let Some(column) = REQUIRED_COLUMNS
            .into_iter()
            .find(|column| !headers.iter().any(|h| h == *column))
        {
            return Err(RosterFileError::MissingColumn(column));
        }

        let mut report = ImportReport::default();
        for (index, result) in reader.records().enumerate() {
            let line = match &result {
                Ok(record) => record.position().map(|p| p.line()),
                Err(e) => e.position().map(|p| p.line()),
            }
            .unwrap_or(index as u64 + 2);

            let row: RosterRow = match result.and_then(|record| record.deserialize(Some(&headers))) {
                Ok(row) => row,
                Err(e) => {
                    log::warn!("Roster line {}: {}", line, e);
                    report.push_error(format!("Row validation error (line {}): {}", line, e));
                    continue;
                }
            };

            let entry = match row.parse() {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Roster line {}: {}", line, e);
                    report.push_error(format!("Row validation error (line {}): {}", line, e));
                    continue;
                }
            };

            match self.upsert(&entry) {
                Ok(Upsert::Created) => report.created += 1,
                Ok(Upsert::Updated) => report.updated += 1,
                Err(e) => {
                    log::error!("Roster line {}: {}", line, e);
                    report.push_error(format!("Row processing error (line {}): {}", line, e));
                }
            }
        }

        log::info!(
            "Roster import: {} created, {} updated, {} errors",
            report.created,
            report.updated,
            report.errors.len()
        );
        Ok(report)
    }

    fn upsert(&self, entry: &RosterEntry) -> Result<Upsert, RosterRowError> {
        self.db.with_transaction(|tx| {
            let department = IdentityResolver::new(tx).department(&entry.department_code)?;

            if user_repo::insert_if_absent(
                tx,
                &entry.username,
                &entry.fio,
                Some(department.id),
                true,
            )? {
                return Ok(Upsert::Created);
            }
            user_repo::update_profile(tx, &entry.username, &entry.fio, Some(department.id), true)?;
            Ok(Upsert::Updated)
        })
    }
}
