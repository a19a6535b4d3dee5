use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{ImportToken, Settings};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/settings-v1.json");

pub const ENV_WATCH_DIR: &str = "PRINT_EVENTS_WATCH_DIR";
pub const ENV_PROCESSED_DIR: &str = "PRINT_EVENTS_PROCESSED_DIR";
pub const ENV_QUARANTINE_DIR: &str = "PRINT_EVENTS_QUARANTINE_DIR";
pub const ENV_MAX_RETRIES: &str = "WATCHER_MAX_RETRIES";
pub const ENV_BACKOFF_BASE: &str = "WATCHER_BACKOFF_BASE";
pub const ENV_BACKOFF_MAX: &str = "WATCHER_BACKOFF_MAX";
pub const ENV_DEADLINE_SECONDS: &str = "WATCHER_DEADLINE_SECONDS";
pub const ENV_STARTUP_SWEEP: &str = "WATCHER_STARTUP_SWEEP";
pub const ENV_POLL_INTERVAL_MS: &str = "WATCHER_POLL_INTERVAL_MS";
pub const ENV_IMPORT_TOKEN: &str = "IMPORT_TOKEN";
pub const ENV_IMPORT_BATCH_SIZE: &str = "IMPORT_BATCH_SIZE";
pub const ENV_IMPORT_MAX_PAYLOAD_BYTES: &str = "IMPORT_MAX_PAYLOAD_BYTES";
pub const ENV_UNKNOWN_USER_POLICY: &str = "UNKNOWN_USER_POLICY";
pub const ENV_DATABASE: &str = "PAGETALLY_DATABASE";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Loads settings from an optional JSON file, then applies process
/// environment overrides and validates the result.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Like [`load_settings`] with an explicit environment lookup.
pub fn load_settings_with<F>(path: Option<&Path>, lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            parse_settings(&content)?
        }
        None => Settings::default(),
    };

    apply_env(&mut settings, lookup)?;
    validate_settings(&settings)?;

    Ok(settings)
}

/// Parses and validates a settings document without environment overrides.
pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings = parse_settings(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    validate_schema(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn apply_env<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Blank variables count as unset.
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let watcher = &mut settings.watcher;
    if let Some(v) = get(ENV_WATCH_DIR) {
        watcher.watch_dir = PathBuf::from(v);
    }
    if let Some(v) = get(ENV_PROCESSED_DIR) {
        watcher.processed_dir = PathBuf::from(v);
    }
    if let Some(v) = get(ENV_QUARANTINE_DIR) {
        watcher.quarantine_dir = PathBuf::from(v);
    }
    if let Some(v) = get(ENV_MAX_RETRIES) {
        watcher.max_retries = parse_env(ENV_MAX_RETRIES, &v)?;
    }
    if let Some(v) = get(ENV_BACKOFF_BASE) {
        watcher.backoff_base_secs = parse_env(ENV_BACKOFF_BASE, &v)?;
    }
    if let Some(v) = get(ENV_BACKOFF_MAX) {
        watcher.backoff_max_secs = parse_env(ENV_BACKOFF_MAX, &v)?;
    }
    if let Some(v) = get(ENV_DEADLINE_SECONDS) {
        watcher.deadline_secs = parse_env(ENV_DEADLINE_SECONDS, &v)?;
    }
    if let Some(v) = get(ENV_STARTUP_SWEEP) {
        watcher.startup_sweep = parse_bool(ENV_STARTUP_SWEEP, &v)?;
    }
    if let Some(v) = get(ENV_POLL_INTERVAL_MS) {
        watcher.poll_interval_ms = parse_env(ENV_POLL_INTERVAL_MS, &v)?;
    }

    let import = &mut settings.import;
    if let Some(v) = get(ENV_IMPORT_TOKEN) {
        import.token = Some(ImportToken::new(v.trim()));
    }
    if let Some(v) = get(ENV_IMPORT_BATCH_SIZE) {
        import.chunk_size = parse_env(ENV_IMPORT_BATCH_SIZE, &v)?;
    }
    if let Some(v) = get(ENV_IMPORT_MAX_PAYLOAD_BYTES) {
        import.max_payload_bytes = parse_env(ENV_IMPORT_MAX_PAYLOAD_BYTES, &v)?;
    }
    if let Some(v) = get(ENV_UNKNOWN_USER_POLICY) {
        import.unknown_user_policy = parse_env(ENV_UNKNOWN_USER_POLICY, &v)?;
    }

    if let Some(v) = get(ENV_DATABASE) {
        settings.database_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get(ENV_LOG_FORMAT) {
        settings.log_format = parse_env(ENV_LOG_FORMAT, &v)?;
    }

    Ok(())
}

/// Checks cross-field constraints the schema cannot express.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });
    let watcher = &settings.watcher;

    if watcher.max_retries == 0 {
        return invalid("max_retries must be at least 1".to_string());
    }
    for (name, value) in [
        ("backoff_base_secs", watcher.backoff_base_secs),
        ("backoff_max_secs", watcher.backoff_max_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            return invalid(format!("{} must be a non-negative number, got {}", name, value));
        }
    }
    if watcher.deadline_secs == 0 {
        return invalid("deadline_secs must be positive".to_string());
    }
    if watcher.poll_interval_ms == 0 {
        return invalid("poll_interval_ms must be positive".to_string());
    }
    if watcher.watch_dir == watcher.processed_dir || watcher.watch_dir == watcher.quarantine_dir {
        return invalid(format!(
            "watch directory '{}' must differ from the processed and quarantine directories",
            watcher.watch_dir.display()
        ));
    }

    if settings.import.chunk_size == 0 {
        return invalid("chunk_size must be at least 1".to_string());
    }
    if settings.import.max_payload_bytes == 0 {
        return invalid("max_payload_bytes must be positive".to_string());
    }

    Ok(())
}
