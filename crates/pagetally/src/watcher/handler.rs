use std::path::Path;

use super::{AttemptError, FileKind};
use crate::ingest::{EventReconciler, ImportReport, RosterImporter};

/// Imports one watched file. Called once per attempt.
pub trait FileHandler: Send + Sync {
    fn handle(&self, kind: FileKind, path: &Path) -> Result<ImportReport, AttemptError>;
}

/// Reads the file and hands it to the event reconciler or roster importer.
///
/// Record-level problems stay in the returned report. Only an unreadable
/// file or a payload that cannot be imported at all fails the attempt.
pub struct IngestHandler {
    reconciler: EventReconciler,
    importer: RosterImporter,
}

impl IngestHandler {
    pub fn new(reconciler: EventReconciler, importer: RosterImporter) -> Self {
        Self { reconciler, importer }
    }
}

impl FileHandler for IngestHandler {
    fn handle(&self, kind: FileKind, path: &Path) -> Result<ImportReport, AttemptError> {
        let content = std::fs::read(path).map_err(|source| AttemptError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;

        match kind {
            FileKind::PrintEvents => self
                .reconciler
                .import_json(&content)
                .map_err(|e| AttemptError::Content(e.to_string())),
            FileKind::UserRoster => self
                .importer
                .try_import_csv(&content)
                .map_err(|e| AttemptError::Content(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::NoopObserver;
    use crate::config::ImportSettings;
    use crate::db::Database;
    use tempfile::TempDir;

    fn handler(db: &Database) -> IngestHandler {
        IngestHandler::new(
            EventReconciler::new(db.clone(), &ImportSettings::default(), Arc::new(NoopObserver)),
            RosterImporter::new(db.clone()),
        )
    }

    #[test]
    fn test_missing_file_is_access_error() {
        let db = Database::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let err = handler(&db)
            .handle(FileKind::PrintEvents, &dir.path().join("gone.json"))
            .unwrap_err();
        assert!(err.is_file_access());
    }

    #[test]
    fn test_invalid_json_is_content_error() {
        let db = Database::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{\"not\": \"a list\"}").unwrap();

        let err = handler(&db).handle(FileKind::PrintEvents, &path).unwrap_err();
        assert!(!err.is_file_access());
        assert_eq!(err.to_string(), "expected a list of events");
    }

    #[test]
    fn test_roster_without_ou_column_is_content_error() {
        let db = Database::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(&path, b"SamAccountName\nalice\n").unwrap();

        let err = handler(&db).handle(FileKind::UserRoster, &path).unwrap_err();
        assert_eq!(err.to_string(), "missing column OU");
    }

    #[test]
    fn test_roster_is_imported() {
        let db = Database::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(&path, b"SamAccountName,DisplayName,OU\nalice,Alice,IT\n").unwrap();

        let report = handler(&db).handle(FileKind::UserRoster, &path).unwrap();
        assert_eq!(report.created, 1);
    }
}
