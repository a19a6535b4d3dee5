//! Drop-directory watcher.
//!
//! Each new `.json` or `.csv` file is supervised until it is either moved
//! to the processed directory or quarantined. Attempts are retried with a
//! capped linear backoff inside a wall-clock deadline.

pub mod clock;
pub mod handler;
pub mod policy;
pub mod scanner;
pub mod storage;
pub mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;

use crate::config::WatcherSettings;
use crate::error::StorageError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handler::{FileHandler, IngestHandler};
pub use policy::{NextStep, RetryPolicy};
pub use scanner::DirectoryScanner;
pub use storage::{FileMover, FsMover, QuarantineReason};
pub use supervisor::{FileOutcome, FileState, FileSupervisor};

/// Creates the output directories, then supervises new files until
/// `shutdown` is set. The optional startup sweep runs after the watcher is
/// registered.
pub fn run(
    settings: &WatcherSettings,
    supervisor: &FileSupervisor,
    shutdown: Arc<AtomicBool>,
) -> Result<(), WatchError> {
    storage::ensure_directory(&settings.processed_dir)?;
    storage::ensure_directory(&settings.quarantine_dir)?;

    let scanner = DirectoryScanner::from_settings(settings);
    scanner.watch(
        settings.startup_sweep,
        |path| {
            supervisor.supervise(&path);
        },
        shutdown,
    )
}

/// Files the watcher acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PrintEvents,
    UserRoster,
}

impl FileKind {
    /// Classifies by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "json" => Some(FileKind::PrintEvents),
            "csv" => Some(FileKind::UserRoster),
            _ => None,
        }
    }

    /// Quarantine reason when the content could not be imported.
    pub fn content_reason(&self) -> QuarantineReason {
        match self {
            FileKind::PrintEvents => QuarantineReason::ImportError,
            FileKind::UserRoster => QuarantineReason::CsvImportError,
        }
    }
}

/// The watcher could not be started.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("File notification error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A single processing attempt failed.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("File access error for '{}': {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Content(String),
}

impl AttemptError {
    pub fn is_file_access(&self) -> bool {
        matches!(self, AttemptError::FileAccess { .. })
    }
}

impl From<StorageError> for AttemptError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MoveFile { from, source, .. } => AttemptError::FileAccess { path: from, source },
            StorageError::CreateDirectory { path, source } | StorageError::ReadFile { path, source } => {
                AttemptError::FileAccess { path, source }
            }
            StorageError::NoFileName(path) | StorageError::NoFreeName(path) => {
                let source =
                    std::io::Error::other(format!("no usable file name for '{}'", path.display()));
                AttemptError::FileAccess { path, source }
            }
        }
    }
}
