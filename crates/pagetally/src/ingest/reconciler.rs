//! Batch import of print events.
//!
//! Records are parsed up front, then stored in chunks: one transaction per
//! chunk and one savepoint per record, so a failing record rolls back only
//! its own writes. Job ids already stored (or seen earlier in the batch)
//! are skipped silently, which makes re-importing a batch a no-op.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::Transaction;
use serde_json::Value;
use tracing::info_span;

use super::error::{IngestError, PayloadError};
use super::record::{ParsedPrintEvent, RawPrintEvent};
use super::report::ImportReport;
use super::resolver::IdentityResolver;
use crate::cache::ImportObserver;
use crate::config::{ImportSettings, UnknownUserPolicy};
use crate::db::event_repo::{self, NewPrintEvent};
use crate::db::user_repo::UserRow;
use crate::db::{format_timestamp, Database, DatabaseError};

type Record = Result<ParsedPrintEvent, IngestError>;

/// What one chunk produced before its commit was attempted.
#[derive(Debug, Default)]
struct ChunkOutcome {
    stored: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ChunkOutcome {
    /// Folds the chunk into `report` and returns the number of events
    /// created. A failed commit discards the stored rows and the
    /// auto-create warnings that went with them.
    fn settle(self, result: Result<(), DatabaseError>, report: &mut ImportReport) -> u64 {
        report.errors.extend(self.errors);
        match result {
            Ok(()) => {
                report.errors.extend(self.warnings);
                let created = self.stored.len() as u64;
                report.created += created;
                created
            }
            Err(e) => {
                for job_id in self.stored {
                    report.push_error(format!("Event import error: job {}: {}", job_id, e));
                }
                0
            }
        }
    }
}

pub struct EventReconciler {
    db: Database,
    chunk_size: usize,
    policy: UnknownUserPolicy,
    observer: Arc<dyn ImportObserver>,
}

impl EventReconciler {
    pub fn new(db: Database, settings: &ImportSettings, observer: Arc<dyn ImportObserver>) -> Self {
        Self {
            db,
            chunk_size: settings.chunk_size.max(1),
            policy: settings.unknown_user_policy,
            observer,
        }
    }

    pub fn policy(&self) -> UnknownUserPolicy {
        self.policy
    }

    /// Imports already-decoded records.
    pub fn import_events(&self, events: &[RawPrintEvent]) -> ImportReport {
        let records = events
            .iter()
            .map(|raw| ParsedPrintEvent::parse(raw).map_err(IngestError::from))
            .collect();
        self.reconcile(records)
    }

    /// Imports a JSON array body. Elements that are not event objects are
    /// reported per record; only a body that is not an array fails as a whole.
    /// A leading UTF-8 BOM is ignored.
    pub fn import_json(&self, body: &[u8]) -> Result<ImportReport, PayloadError> {
        let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
        let value: Value = serde_json::from_slice(body)?;
        let Value::Array(items) = value else {
            return Err(PayloadError::NotAList);
        };

        let records = items
            .into_iter()
            .map(|item| {
                let raw: RawPrintEvent =
                    serde_json::from_value(item).map_err(|e| IngestError::Decode(e.to_string()))?;
                Ok(ParsedPrintEvent::parse(&raw)?)
            })
            .collect();
        Ok(self.reconcile(records))
    }

    fn reconcile(&self, records: Vec<Record>) -> ImportReport {
        let run_id = uuid::Uuid::new_v4();
        let _span = info_span!("import_events",
            run_id = %run_id,
            records = records.len(),
        )
        .entered();

        let mut report = ImportReport::default();

        let candidates: Vec<String> = records
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|e| e.job_id.clone()))
            .collect();
        let mut known = match self
            .db
            .with_conn(|conn| event_repo::find_existing_job_ids(conn, &candidates))
        {
            Ok(existing) => existing,
            Err(e) => {
                // The job_id constraint still rejects duplicates.
                log::error!("Failed to preload existing job ids: {}", e);
                HashSet::new()
            }
        };

        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            let _chunk_span = info_span!("chunk", index, size = chunk.len()).entered();

            let mut outcome = ChunkOutcome::default();
            let result: Result<(), DatabaseError> = self.db.with_transaction(|tx| {
                for record in chunk {
                    let event = match record {
                        Ok(event) => event,
                        Err(e) => {
                            log::warn!("Skipping print event: {}", e);
                            outcome.errors.push(e.to_string());
                            continue;
                        }
                    };
                    if !known.insert(event.job_id.clone()) {
                        continue;
                    }
                    match self.store(tx, event) {
                        Ok(warning) => {
                            outcome.stored.push(event.job_id.clone());
                            outcome.warnings.extend(warning);
                        }
                        Err(e) => {
                            match e {
                                IngestError::Database(_) => {
                                    log::error!("Job {}: {}", event.job_id, e)
                                }
                                _ => log::warn!("Job {}: {}", event.job_id, e),
                            }
                            outcome.errors.push(e.to_string());
                        }
                    }
                }
                Ok(())
            });

            if let Err(e) = &result {
                log::error!("Chunk {} failed to commit: {}", index, e);
            }
            let created = outcome.settle(result, &mut report);
            if created > 0 {
                self.observer.events_committed(created);
            }
        }

        log::info!(
            "Imported {} print events ({} messages)",
            report.created,
            report.errors.len()
        );
        report
    }

    /// Stores one event inside its own savepoint. Returns the auto-create
    /// warning, if the user had to be created.
    fn store(
        &self,
        tx: &mut Transaction<'_>,
        event: &ParsedPrintEvent,
    ) -> Result<Option<String>, IngestError> {
        let sp = tx.savepoint().map_err(DatabaseError::from)?;

        let warning = {
            let resolver = IdentityResolver::new(&sp);
            let printer = resolver.printer_for_key(&event.printer)?;
            let (user, warning) = self.resolve_user(&resolver, &event.username)?;
            let computer = event
                .computer
                .as_ref()
                .map(|key| resolver.computer(key))
                .transpose()?;
            let port = event
                .port
                .as_ref()
                .map(|key| resolver.port(key))
                .transpose()?;

            let timestamp = format_timestamp(&event.timestamp);
            event_repo::insert(
                &sp,
                &NewPrintEvent {
                    document_id: event.document_id,
                    document_name: &event.document_name,
                    job_id: &event.job_id,
                    timestamp: &timestamp,
                    byte_size: event.byte_size,
                    pages: event.pages,
                    user_id: user.id,
                    printer_id: printer.id,
                    computer_id: computer.map(|c| c.id),
                    port_id: port.map(|p| p.id),
                },
            )?;
            warning
        };

        sp.commit().map_err(DatabaseError::from)?;
        Ok(warning)
    }

    fn resolve_user(
        &self,
        resolver: &IdentityResolver<'_>,
        username: &str,
    ) -> Result<(UserRow, Option<String>), IngestError> {
        match self.policy {
            UnknownUserPolicy::AutoCreate => {
                let (user, created) = resolver.user(username)?;
                let warning = created.then(|| {
                    log::warn!("User '{}' not found during import, created automatically", username);
                    format!(
                        "User '{}' was automatically created (missing FIO and department)",
                        username
                    )
                });
                Ok((user, warning))
            }
            UnknownUserPolicy::Reject => resolver
                .find_user(username)?
                .map(|user| (user, None))
                .ok_or_else(|| IngestError::UnknownUser(username.to_string())),
        }
    }
}
