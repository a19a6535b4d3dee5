use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Process settings, built once at startup and passed into constructors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Falls back to [`crate::db::default_database_path`] when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub watcher: WatcherSettings,
    #[serde(default)]
    pub import: ImportSettings,
}

impl Settings {
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherSettings {
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: PathBuf,
    /// Attempts per file, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Process files already in the watch directory at startup.
    #[serde(default = "default_true")]
    pub startup_sweep: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("./watch_dir")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("./processed_dir")
}

fn default_quarantine_dir() -> PathBuf {
    PathBuf::from("./quarantine_dir")
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_secs() -> f64 {
    2.0
}

fn default_backoff_max_secs() -> f64 {
    30.0
}

fn default_deadline_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            processed_dir: default_processed_dir(),
            quarantine_dir: default_quarantine_dir(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            deadline_secs: default_deadline_secs(),
            startup_sweep: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatcherSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportSettings {
    /// Only ever read from the environment.
    #[serde(skip)]
    pub token: Option<ImportToken>,
    /// Records per transaction.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default)]
    pub unknown_user_policy: UnknownUserPolicy,
}

fn default_chunk_size() -> usize {
    100
}

fn default_max_payload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            token: None,
            chunk_size: default_chunk_size(),
            max_payload_bytes: default_max_payload_bytes(),
            unknown_user_policy: UnknownUserPolicy::default(),
        }
    }
}

/// Shared-secret import token. `Debug` never shows the value.
#[derive(Clone)]
pub struct ImportToken(Arc<SecretString>);

impl ImportToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(SecretString::from(token.into())))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for ImportToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImportToken(****)")
    }
}

/// What to do with a print event whose username is not in the roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownUserPolicy {
    /// Create the user (no display name, no department) and report a warning.
    #[default]
    AutoCreate,
    /// Reject the record.
    Reject,
}

impl FromStr for UnknownUserPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "auto_create" | "autocreate" => Ok(UnknownUserPolicy::AutoCreate),
            "reject" => Ok(UnknownUserPolicy::Reject),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(other.to_string()),
        }
    }
}
