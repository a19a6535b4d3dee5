pub mod loader;
pub mod schema;

pub use crate::error::ConfigError;
pub use loader::{load_settings, load_settings_from_str, load_settings_with, validate_settings};
pub use schema::{
    ImportSettings, ImportToken, LogFormat, Settings, UnknownUserPolicy, WatcherSettings,
};
