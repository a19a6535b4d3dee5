use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use super::{FileKind, WatchError};
use crate::config::WatcherSettings;

const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(500);
const SHUTDOWN_CHECK: Duration = Duration::from_millis(100);

/// Finds print-event and roster files in the top level of the watch directory.
pub struct DirectoryScanner {
    watch_dir: PathBuf,
    poll_interval: Duration,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(watch_dir: P, poll_interval: Duration) -> Self {
        Self {
            watch_dir: watch_dir.as_ref().to_path_buf(),
            poll_interval,
        }
    }

    pub fn from_settings(settings: &WatcherSettings) -> Self {
        Self::new(&settings.watch_dir, settings.poll_interval())
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Files already present, sorted by name. Used for the startup sweep.
    pub fn scan(&self) -> Result<Vec<PathBuf>, WatchError> {
        if !self.watch_dir.is_dir() {
            return Err(WatchError::MissingDirectory(self.watch_dir.clone()));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.watch_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| FileKind::from_path(p).is_some())
            .collect();
        files.sort();

        info!(
            "Found {} pending files in {}",
            files.len(),
            self.watch_dir.display()
        );
        Ok(files)
    }

    /// Calls `callback` for every new or changed file until `shutdown` is
    /// set. The callback runs on the watch thread.
    ///
    /// With `sweep`, files already present are handed to `callback` once
    /// the watcher is registered, so nothing dropped during the sweep is
    /// missed.
    pub fn watch<F>(
        &self,
        sweep: bool,
        mut callback: F,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), WatchError>
    where
        F: FnMut(PathBuf),
    {
        if !self.watch_dir.is_dir() {
            return Err(WatchError::MissingDirectory(self.watch_dir.clone()));
        }

        // Polling works on network shares and container mounts.
        let poll_config = NotifyConfig::default().with_poll_interval(self.poll_interval);
        let debouncer_config = DebouncerConfig::default()
            .with_timeout(DEBOUNCE_TIMEOUT)
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)?;
        debouncer
            .watcher()
            .watch(&self.watch_dir, RecursiveMode::NonRecursive)?;

        info!("Watching directory: {}", self.watch_dir.display());

        if sweep {
            for path in self.scan()? {
                callback(path);
            }
        }

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Watcher shutting down");
                break;
            }

            match rx.recv_timeout(SHUTDOWN_CHECK) {
                Ok(Ok(events)) => {
                    for event in events {
                        if !matches!(event.kind, DebouncedEventKind::Any) {
                            continue;
                        }
                        let path = event.path;
                        // Moves out of the directory are reported too.
                        if !path.is_file() {
                            continue;
                        }
                        if FileKind::from_path(&path).is_none() {
                            debug!("Ignoring {}", path.display());
                            continue;
                        }
                        info!("New file detected: {}", path.display());
                        callback(path);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Watch error: {:?}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}
