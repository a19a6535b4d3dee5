use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Moves files out of the watch directory.
pub trait FileMover: Send + Sync {
    /// Moves `src` into `directory` as `file_name`, appending `_2`, `_3`, …
    /// when the name is taken. Returns the final path.
    fn move_into(&self, src: &Path, directory: &Path, file_name: &str)
        -> Result<PathBuf, StorageError>;
}

/// File-system mover.
pub struct FsMover;

impl FileMover for FsMover {
    fn move_into(
        &self,
        src: &Path,
        directory: &Path,
        file_name: &str,
    ) -> Result<PathBuf, StorageError> {
        ensure_directory(directory)?;
        let dst = resolve_conflict(directory, file_name)?;
        move_file(src, &dst)?;
        Ok(dst)
    }
}

/// Why a file ended up in quarantine. Rendered into the quarantine name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineReason {
    ImportError,
    CsvImportError,
    AccessError,
    DeadlineExceeded,
}

impl QuarantineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineReason::ImportError => "import_error",
            QuarantineReason::CsvImportError => "csv_import_error",
            QuarantineReason::AccessError => "access_error",
            QuarantineReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{YYYYMMDDTHHMMSSZ}-{sha256[:12] | nohash}-{reason}{.ext}`
pub fn quarantine_name(
    original: &Path,
    content: Option<&[u8]>,
    reason: QuarantineReason,
    at: DateTime<Utc>,
) -> String {
    let digest = match content {
        Some(bytes) => hex::encode(Sha256::digest(bytes))[..12].to_string(),
        None => "nohash".to_string(),
    };
    let ext = original
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    format!(
        "{}-{}-{}{}",
        at.format("%Y%m%dT%H%M%SZ"),
        digest,
        reason.as_str(),
        ext
    )
}

/// Renames `src` to `dst`, falling back to copy and delete across devices.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let move_error = |e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    };
    std::fs::copy(src, dst).map_err(move_error)?;
    std::fs::remove_file(src).map_err(move_error)?;
    Ok(())
}

pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// First free path for `filename` in `directory`: the name itself, then
/// `base_2.ext` up to `base_1000.ext`.
pub fn resolve_conflict(directory: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let path = directory.join(filename);
    // symlink_metadata also sees broken symlinks
    if std::fs::symlink_metadata(&path).is_err() {
        return Ok(path);
    }

    let (base, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => (&filename[..dot], &filename[dot..]),
        _ => (filename, ""),
    };

    for counter in 2..=1000 {
        let candidate = directory.join(format!("{}_{}{}", base, counter, ext));
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }

    Err(StorageError::NoFreeName(path))
}
