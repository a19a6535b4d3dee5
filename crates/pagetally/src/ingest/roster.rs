//! Directory-export roster rows.

use serde::Deserialize;

use super::error::ValidationError;

pub const USERNAME_COLUMN: &str = "SamAccountName";
pub const DISPLAY_NAME_COLUMN: &str = "DisplayName";
pub const DEPARTMENT_COLUMN: &str = "OU";

/// Columns that must be present in the header row.
pub const REQUIRED_COLUMNS: [&str; 2] = [USERNAME_COLUMN, DEPARTMENT_COLUMN];

/// One CSV row as exported by the directory service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterRow {
    #[serde(rename = "SamAccountName", default)]
    pub sam_account_name: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
    #[serde(rename = "OU", default)]
    pub ou: String,
}

/// A validated roster entry ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Lower-cased.
    pub username: String,
    pub fio: String,
    /// Upper-cased.
    pub department_code: String,
}

impl RosterRow {
    /// `Ok(None)` for rows without an organizational unit; those are
    /// skipped without being reported.
    pub fn parse(&self) -> Result<Option<RosterEntry>, ValidationError> {
        let department_code = self.ou.trim().to_uppercase();
        if department_code.is_empty() {
            return Ok(None);
        }

        let username = self.sam_account_name.trim().to_lowercase();
        if username.is_empty() {
            return Err(ValidationError::MissingRosterUsername);
        }

        let fio = match self.display_name.trim() {
            "" => username.clone(),
            name => name.to_string(),
        };

        Ok(Some(RosterEntry {
            username,
            fio,
            department_code,
        }))
    }
}
