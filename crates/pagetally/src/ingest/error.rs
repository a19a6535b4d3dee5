use thiserror::Error;

use crate::db::DatabaseError;

/// A required field is missing or blank.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing username (Param3)")]
    MissingUsername,

    #[error("Missing username (SamAccountName)")]
    MissingRosterUsername,

    #[error("{kind} code is empty")]
    EmptyCode { kind: &'static str },
}

/// A single upstream record could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid printer format: {0}")]
    InvalidPrinterFormat(String),

    #[error("Invalid printer index: {0}")]
    InvalidPrinterIndex(String),

    #[error("Invalid TimeCreated: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid number in {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Why one record of a batch was not stored. The `Display` form is the
/// line reported in `ImportReport::errors`.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Event integrity error: {0}")]
    Integrity(DatabaseError),

    #[error("Event import error: {0}")]
    Database(DatabaseError),

    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error("Event validation error: {0}")]
    Decode(String),
}

/// Why one roster row was not stored.
#[derive(Error, Debug)]
pub enum RosterRowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("User integrity error: {0}")]
    Integrity(DatabaseError),

    #[error("User import error: {0}")]
    Database(DatabaseError),

    #[error("{0}")]
    Rejected(String),
}

/// The request body as a whole is unusable.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a list of events")]
    NotAList,
}

/// A roster file that cannot be read as a whole.
#[derive(Error, Debug)]
pub enum RosterFileError {
    #[error("invalid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("missing column {0}")]
    MissingColumn(&'static str),
}

impl From<DatabaseError> for IngestError {
    fn from(err: DatabaseError) -> Self {
        if err.is_unique_violation() {
            IngestError::Integrity(err)
        } else {
            IngestError::Database(err)
        }
    }
}

impl From<DatabaseError> for RosterRowError {
    fn from(err: DatabaseError) -> Self {
        if err.is_unique_violation() {
            RosterRowError::Integrity(err)
        } else {
            RosterRowError::Database(err)
        }
    }
}

impl From<IngestError> for RosterRowError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(e) | IngestError::Parse(ParseError::Validation(e)) => {
                RosterRowError::Validation(e)
            }
            IngestError::Integrity(e) => RosterRowError::Integrity(e),
            IngestError::Database(e) => RosterRowError::Database(e),
            other => RosterRowError::Rejected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            IngestError::from(ParseError::from(ValidationError::MissingUsername)).to_string(),
            "Missing username (Param3)"
        );
        assert_eq!(
            ParseError::InvalidPrinterFormat("HP-B1".into()).to_string(),
            "Invalid printer format: HP-B1"
        );
        assert_eq!(
            ValidationError::EmptyCode { kind: "Department" }.to_string(),
            "Department code is empty"
        );
        assert_eq!(
            IngestError::UnknownUser("ghost".into()).to_string(),
            "User not found: ghost"
        );
    }

    #[test]
    fn test_database_errors_are_classified() {
        assert!(matches!(
            IngestError::from(DatabaseError::LockPoisoned),
            IngestError::Database(_)
        ));
        assert!(IngestError::from(DatabaseError::LockPoisoned)
            .to_string()
            .starts_with("Event import error: "));
    }

    #[test]
    fn test_roster_row_errors_name_the_user() {
        let err = RosterRowError::from(IngestError::from(DatabaseError::LockPoisoned));
        assert!(matches!(err, RosterRowError::Database(_)));
        assert!(err.to_string().starts_with("User import error: "));

        let err = RosterRowError::from(IngestError::from(ValidationError::EmptyCode {
            kind: "Department",
        }));
        assert_eq!(err.to_string(), "Department code is empty");
    }
}
