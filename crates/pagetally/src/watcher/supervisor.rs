//! Per-file state machine: `Detected → Attempting(n) → Processed | Quarantined`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tracing::info_span;

use super::clock::{Clock, SystemClock};
use super::handler::FileHandler;
use super::policy::{NextStep, RetryPolicy};
use super::storage::{quarantine_name, FileMover, FsMover, QuarantineReason};
use super::{AttemptError, FileKind};
use crate::config::WatcherSettings;
use crate::error::StorageError;
use crate::ingest::ImportReport;
use crate::sanitize::{hash_path, redact_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Detected,
    Attempting(u32),
    Processed,
    Quarantined(QuarantineReason),
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileState::Detected => f.write_str("detected"),
            FileState::Attempting(n) => write!(f, "attempting({})", n),
            FileState::Processed => f.write_str("processed"),
            FileState::Quarantined(reason) => write!(f, "quarantined({})", reason),
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    /// Not a `.json` or `.csv` file.
    Ignored,
    Processed {
        destination: PathBuf,
        report: ImportReport,
        attempts: u32,
    },
    /// `destination` is `None` when the move into quarantine itself failed
    /// and the file was left in place.
    Quarantined {
        destination: Option<PathBuf>,
        reason: QuarantineReason,
        attempts: u32,
    },
}

pub struct FileSupervisor {
    handler: Arc<dyn FileHandler>,
    mover: Arc<dyn FileMover>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    processed_dir: PathBuf,
    quarantine_dir: PathBuf,
}

impl FileSupervisor {
    pub fn new(settings: &WatcherSettings, handler: Arc<dyn FileHandler>) -> Self {
        Self {
            handler,
            mover: Arc::new(FsMover),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::from_settings(settings),
            processed_dir: settings.processed_dir.clone(),
            quarantine_dir: settings.quarantine_dir.clone(),
        }
    }

    pub fn with_mover(mut self, mover: Arc<dyn FileMover>) -> Self {
        self.mover = mover;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drives one file to a terminal state. Never panics on bad input.
    pub fn supervise(&self, path: &Path) -> FileOutcome {
        let Some(kind) = FileKind::from_path(path) else {
            debug!("Ignoring {}", path.display());
            return FileOutcome::Ignored;
        };

        let file = redact_path(path);
        let _span = info_span!("supervise_file",
            file = %file,
            path_hash = %hash_path(path),
            kind = ?kind,
        )
        .entered();

        let started = self.clock.now();
        let mut state = FileState::Detected;
        info!("{}: {}", file, state);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.transition(&file, &mut state, FileState::Attempting(attempt));

            let err = match self.attempt(kind, path) {
                Ok((destination, report)) => {
                    info!(
                        "{}: {} created, {} updated, {} errors; moved to {}",
                        file,
                        report.created,
                        report.updated,
                        report.errors.len(),
                        destination.display()
                    );
                    self.transition(&file, &mut state, FileState::Processed);
                    return FileOutcome::Processed {
                        destination,
                        report,
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            if err.is_file_access() {
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    file, attempt, self.policy.max_attempts, err
                );
            } else {
                error!(
                    "{}: attempt {}/{} failed: {}",
                    file, attempt, self.policy.max_attempts, err
                );
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            let reason = match self.policy.after_failure(attempt, elapsed) {
                NextStep::Retry(delay) => {
                    debug!("{}: retrying in {:?}", file, delay);
                    self.clock.sleep(delay);
                    continue;
                }
                NextStep::Exhausted if err.is_file_access() => QuarantineReason::AccessError,
                NextStep::Exhausted => kind.content_reason(),
                NextStep::DeadlineExceeded => {
                    error!("{}: deadline exceeded after {:?}, giving up", file, elapsed);
                    QuarantineReason::DeadlineExceeded
                }
            };

            let destination = self.quarantine(path, reason);
            self.transition(&file, &mut state, FileState::Quarantined(reason));
            return FileOutcome::Quarantined {
                destination,
                reason,
                attempts: attempt,
            };
        }
    }

    fn attempt(&self, kind: FileKind, path: &Path) -> Result<(PathBuf, ImportReport), AttemptError> {
        let report = self.handler.handle(kind, path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::NoFileName(path.to_path_buf()))?;
        let destination = self.mover.move_into(path, &self.processed_dir, file_name)?;
        Ok((destination, report))
    }

    fn quarantine(&self, path: &Path, reason: QuarantineReason) -> Option<PathBuf> {
        let content = std::fs::read(path).ok();
        let name = quarantine_name(path, content.as_deref(), reason, self.clock.utc_now());
        match self.mover.move_into(path, &self.quarantine_dir, &name) {
            Ok(destination) => {
                error!("{} moved to quarantine: {}", redact_path(path), destination.display());
                Some(destination)
            }
            Err(e) => {
                error!("Failed to quarantine {}: {}", redact_path(path), e);
                None
            }
        }
    }

    fn transition(&self, file: &str, state: &mut FileState, next: FileState) {
        info!("{}: {} -> {}", file, state, next);
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::watcher::clock::ManualClock;

    /// Fails the first `failures` calls, then succeeds.
    struct ScriptedHandler {
        failures: u32,
        access: bool,
        calls: Mutex<u32>,
    }

    impl ScriptedHandler {
        fn new(failures: u32, access: bool) -> Arc<Self> {
            Arc::new(Self {
                failures,
                access,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl FileHandler for ScriptedHandler {
        fn handle(&self, _kind: FileKind, path: &Path) -> Result<ImportReport, AttemptError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                if self.access {
                    return Err(AttemptError::FileAccess {
                        path: path.to_path_buf(),
                        source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                    });
                }
                return Err(AttemptError::Content("bad payload".into()));
            }
            Ok(ImportReport {
                created: 1,
                ..ImportReport::default()
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        settings: WatcherSettings,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let settings = WatcherSettings {
                watch_dir: dir.path().join("watch"),
                processed_dir: dir.path().join("processed"),
                quarantine_dir: dir.path().join("quarantine"),
                max_retries: 3,
                backoff_base_secs: 2.0,
                backoff_max_secs: 3.0,
                deadline_secs: 300,
                ..WatcherSettings::default()
            };
            std::fs::create_dir_all(&settings.watch_dir).unwrap();
            let clock = Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            ));
            Self {
                _dir: dir,
                settings,
                clock,
            }
        }

        fn drop_file(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.settings.watch_dir.join(name);
            std::fs::write(&path, content).unwrap();
            path
        }

        fn supervisor(&self, handler: Arc<dyn FileHandler>) -> FileSupervisor {
            FileSupervisor::new(&self.settings, handler).with_clock(self.clock.clone())
        }
    }

    #[test]
    fn test_success_moves_to_processed() {
        let fx = Fixture::new();
        let path = fx.drop_file("events.json", b"[]");
        let handler = ScriptedHandler::new(0, false);

        let outcome = fx.supervisor(handler.clone()).supervise(&path);
        match outcome {
            FileOutcome::Processed {
                destination,
                attempts,
                report,
            } => {
                assert_eq!(destination, fx.settings.processed_dir.join("events.json"));
                assert_eq!(attempts, 1);
                assert_eq!(report.created, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!path.exists());
        assert!(fx.clock.sleeps().is_empty());
    }

    #[test]
    fn test_retry_then_success_sleeps_with_backoff() {
        let fx = Fixture::new();
        let path = fx.drop_file("users.csv", b"x");
        let handler = ScriptedHandler::new(2, true);

        let outcome = fx.supervisor(handler.clone()).supervise(&path);
        assert!(matches!(outcome, FileOutcome::Processed { attempts: 3, .. }));
        assert_eq!(handler.calls(), 3);
        assert_eq!(
            fx.clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(3)]
        );
    }

    #[test]
    fn test_exhausted_content_error_is_quarantined() {
        let fx = Fixture::new();
        let path = fx.drop_file("events.json", b"abc");
        let handler = ScriptedHandler::new(u32::MAX, false);

        let outcome = fx.supervisor(handler.clone()).supervise(&path);
        let FileOutcome::Quarantined {
            destination: Some(destination),
            reason,
            attempts,
        } = outcome
        else {
            panic!("expected quarantine, got {:?}", outcome);
        };
        assert_eq!(reason, QuarantineReason::ImportError);
        assert_eq!(attempts, 3);
        assert_eq!(handler.calls(), 3);
        // No sleep after the last attempt.
        assert_eq!(fx.clock.sleeps().len(), 2);
        assert_eq!(
            destination,
            fx.settings
                .quarantine_dir
                .join("20240301T100005Z-ba7816bf8f01-import_error.json")
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_exhausted_access_error_reason() {
        let fx = Fixture::new();
        let path = fx.drop_file("users.csv", b"abc");
        let outcome = fx
            .supervisor(ScriptedHandler::new(u32::MAX, true))
            .supervise(&path);
        assert!(matches!(
            outcome,
            FileOutcome::Quarantined {
                reason: QuarantineReason::AccessError,
                ..
            }
        ));
    }

    #[test]
    fn test_csv_content_error_reason() {
        let fx = Fixture::new();
        let path = fx.drop_file("users.csv", b"abc");
        let outcome = fx
            .supervisor(ScriptedHandler::new(u32::MAX, false))
            .supervise(&path);
        assert!(matches!(
            outcome,
            FileOutcome::Quarantined {
                reason: QuarantineReason::CsvImportError,
                ..
            }
        ));
    }

    #[test]
    fn test_deadline_stops_retries_early() {
        let mut fx = Fixture::new();
        fx.settings.max_retries = 10;
        fx.settings.deadline_secs = 4;
        let path = fx.drop_file("events.json", b"abc");
        let handler = ScriptedHandler::new(u32::MAX, false);

        let outcome = fx.supervisor(handler.clone()).supervise(&path);
        assert!(matches!(
            outcome,
            FileOutcome::Quarantined {
                reason: QuarantineReason::DeadlineExceeded,
                attempts: 2,
                ..
            }
        ));
        // 2s after the first failure; 2 + 3 > 4 after the second.
        assert_eq!(fx.clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn test_other_extensions_are_ignored() {
        let fx = Fixture::new();
        let path = fx.drop_file("readme.txt", b"hi");
        let handler = ScriptedHandler::new(0, false);
        let outcome = fx.supervisor(handler.clone()).supervise(&path);
        assert!(matches!(outcome, FileOutcome::Ignored));
        assert_eq!(handler.calls(), 0);
        assert!(path.exists());
    }
}
