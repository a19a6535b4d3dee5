//! Isolated environment for watcher and ingestion tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use pagetally::cache::{ImportObserver, StatsCacheVersion};
use pagetally::config::{ImportSettings, UnknownUserPolicy, WatcherSettings};
use pagetally::db::catalog_repo::{count_rows, Table};
use pagetally::db::Database;
use pagetally::ingest::{EventReconciler, RosterImporter};
use pagetally::watcher::{FileOutcome, FileSupervisor, IngestHandler, ManualClock};

pub struct TestHarness {
    temp_dir: TempDir,
    pub watch_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub db: Database,
    pub version: StatsCacheVersion,
    pub watcher: WatcherSettings,
    pub import: ImportSettings,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let watch_dir = base.join("watch_dir");
        let processed_dir = base.join("processed_dir");
        let quarantine_dir = base.join("quarantine_dir");
        std::fs::create_dir_all(&watch_dir).expect("Failed to create watch directory");

        let watcher = WatcherSettings {
            watch_dir: watch_dir.clone(),
            processed_dir: processed_dir.clone(),
            quarantine_dir: quarantine_dir.clone(),
            max_retries: 3,
            backoff_base_secs: 1.0,
            backoff_max_secs: 2.0,
            deadline_secs: 60,
            startup_sweep: true,
            poll_interval_ms: 50,
        };

        let db = Database::open_in_memory().expect("Failed to open database");
        let version = StatsCacheVersion::new(db.clone());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        ));

        Self {
            temp_dir,
            watch_dir,
            processed_dir,
            quarantine_dir,
            db,
            version,
            watcher,
            import: ImportSettings {
                chunk_size: 2,
                ..ImportSettings::default()
            },
            clock,
        }
    }

    pub fn with_policy(mut self, policy: UnknownUserPolicy) -> Self {
        self.import.unknown_user_policy = policy;
        self
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn reconciler(&self) -> EventReconciler {
        let observer: Arc<dyn ImportObserver> = Arc::new(self.version.clone());
        EventReconciler::new(self.db.clone(), &self.import, observer)
    }

    pub fn importer(&self) -> RosterImporter {
        RosterImporter::new(self.db.clone())
    }

    pub fn supervisor(&self) -> FileSupervisor {
        let handler = Arc::new(IngestHandler::new(self.reconciler(), self.importer()));
        FileSupervisor::new(&self.watcher, handler).with_clock(self.clock.clone())
    }

    /// Writes a file into the watch directory.
    pub fn drop_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.watch_dir.join(name);
        std::fs::write(&path, content).expect("Failed to write watched file");
        path
    }

    /// Drops a file and supervises it to a terminal state.
    pub fn process(&self, name: &str, content: &[u8]) -> FileOutcome {
        let path = self.drop_file(name, content);
        self.supervisor().supervise(&path)
    }

    pub fn count(&self, table: Table) -> u64 {
        self.db
            .with_conn(|conn| count_rows(conn, table))
            .expect("Failed to count rows")
    }

    pub fn files_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
