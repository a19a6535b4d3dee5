pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod sanitize;
pub mod trigger;
pub mod watcher;

pub use cache::{ImportObserver, NoopObserver, StatsCache, StatsCacheVersion};
pub use config::{load_settings, ImportSettings, Settings, UnknownUserPolicy, WatcherSettings};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, PagetallyError, Result, StorageError};
pub use ingest::{EventReconciler, ImportReport, RawPrintEvent, RosterImporter};
pub use trigger::{ApiResponse, ImportGate, RequestError};
pub use watcher::{DirectoryScanner, FileOutcome, FileSupervisor, IngestHandler, WatchError};
