//! Print event records: the loose upstream shape and its validated form.
//!
//! Upstream exports are produced by PowerShell scripts and are not strict
//! about types: `Param1` may arrive as `"42"` or `42`, `JobID` may be a
//! number, blank strings stand in for missing values. [`LooseValue`]
//! absorbs that; [`ParsedPrintEvent::parse`] is where the record is either
//! accepted as fully typed or rejected with a [`ParseError`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{ParseError, ValidationError};

/// Maximum stored length of a job id.
pub const JOB_ID_MAX_LEN: usize = 64;

const AUTO_JOB_ID_PREFIX: &str = "AUTO-";

/// A JSON scalar of unknown type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl LooseValue {
    /// String form of the value, `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            LooseValue::Null => None,
            LooseValue::Bool(b) => Some(b.to_string()),
            LooseValue::Int(i) => Some(i.to_string()),
            LooseValue::Float(f) => Some(f.to_string()),
            LooseValue::Text(s) => Some(s.clone()),
        }
    }

    /// Integer form of the value. Null and blank text are 0; floats are
    /// truncated toward zero.
    pub fn as_int(&self, field: &'static str) -> Result<i64, ParseError> {
        let invalid = |value: String| ParseError::InvalidNumber { field, value };
        match self {
            LooseValue::Null => Ok(0),
            LooseValue::Bool(b) => Ok(i64::from(*b)),
            LooseValue::Int(i) => Ok(*i),
            LooseValue::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
            LooseValue::Float(f) => Err(invalid(f.to_string())),
            LooseValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                trimmed.parse().map_err(|_| invalid(s.clone()))
            }
        }
    }
}

impl From<&str> for LooseValue {
    fn from(s: &str) -> Self {
        LooseValue::Text(s.to_string())
    }
}

impl From<i64> for LooseValue {
    fn from(i: i64) -> Self {
        LooseValue::Int(i)
    }
}

/// One element of the print-event JSON array, with the upstream field
/// names. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPrintEvent {
    /// Document id.
    #[serde(rename = "Param1", default)]
    pub param1: LooseValue,
    /// Document name.
    #[serde(rename = "Param2", default)]
    pub param2: LooseValue,
    /// Username.
    #[serde(rename = "Param3", default)]
    pub param3: LooseValue,
    /// Computer hostname.
    #[serde(rename = "Param4", default)]
    pub param4: LooseValue,
    /// Printer composite key.
    #[serde(rename = "Param5", default)]
    pub param5: LooseValue,
    /// Port name.
    #[serde(rename = "Param6", default)]
    pub param6: LooseValue,
    /// Byte size.
    #[serde(rename = "Param7", default)]
    pub param7: LooseValue,
    /// Page count.
    #[serde(rename = "Param8", default)]
    pub param8: LooseValue,
    #[serde(rename = "JobID", default)]
    pub job_id: LooseValue,
    /// `/Date(<epoch-ms>)/`. `null` and absent are the same.
    #[serde(rename = "TimeCreated", default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<LooseValue>,
}

/// `model-building-department-room-index`, the printer's composite name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterKey {
    /// The trimmed key as received; used as the printer's display name.
    pub name: String,
    pub model_code: String,
    pub building_code: String,
    pub department_code: String,
    pub room_number: String,
    pub index: i64,
}

impl PrinterKey {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let name = raw.trim();
        let parts: Vec<&str> = name.split('-').map(str::trim).collect();
        if parts.len() != 5 || parts.iter().any(|p| p.is_empty()) {
            return Err(ParseError::InvalidPrinterFormat(name.to_string()));
        }
        let index = parts[4]
            .parse()
            .map_err(|_| ParseError::InvalidPrinterIndex(parts[4].to_string()))?;

        Ok(Self {
            name: name.to_string(),
            model_code: parts[0].to_string(),
            building_code: parts[1].to_string(),
            department_code: parts[2].to_string(),
            room_number: parts[3].to_string(),
            index,
        })
    }
}

/// Location decoded from a structured computer or port name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointLocationKey {
    pub building_code: String,
    pub department_code: String,
    pub room_number: String,
    /// Number in room (computers) or printer index (ports); 0 when the
    /// segment is not numeric.
    pub index: i64,
}

/// A computer hostname or port name, lower-cased. `location` is `None`
/// when the name does not follow the composite convention; such names
/// are still stored, just without location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointKey {
    pub name: String,
    pub location: Option<EndpointLocationKey>,
}

pub type ComputerKey = EndpointKey;
pub type PortKey = EndpointKey;

impl EndpointKey {
    /// `building-department-room-number`. `None` for a blank name.
    pub fn parse_computer(raw: &str) -> Option<ComputerKey> {
        Self::parse_with(raw, 4, 0)
    }

    /// `model-building-department-room-index`. `None` for a blank name.
    pub fn parse_port(raw: &str) -> Option<PortKey> {
        Self::parse_with(raw, 5, 1)
    }

    fn parse_with(raw: &str, segments: usize, skip: usize) -> Option<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }

        let parts: Vec<&str> = name.split('-').map(str::trim).collect();
        let location = if parts.len() == segments && parts.iter().all(|p| !p.is_empty()) {
            let rest = &parts[skip..];
            Some(EndpointLocationKey {
                building_code: rest[0].to_string(),
                department_code: rest[1].to_string(),
                room_number: rest[2].to_string(),
                index: rest[3].parse().unwrap_or(0),
            })
        } else {
            None
        };

        Some(Self { name, location })
    }
}

/// A fully validated print event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrintEvent {
    pub document_id: i64,
    pub document_name: String,
    pub username: String,
    pub byte_size: i64,
    pub pages: i64,
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub printer: PrinterKey,
    pub computer: Option<ComputerKey>,
    pub port: Option<PortKey>,
}

impl ParsedPrintEvent {
    pub fn parse(raw: &RawPrintEvent) -> Result<Self, ParseError> {
        let username = raw.param3.as_text().unwrap_or_default().trim().to_lowercase();
        if username.is_empty() {
            return Err(ValidationError::MissingUsername.into());
        }

        let document_id = raw.param1.as_int("Param1")?;
        let byte_size = raw.param7.as_int("Param7")?;
        let pages = raw.param8.as_int("Param8")?;
        let timestamp = decode_time_created(raw.time_created.as_ref())?;

        let job_id = match raw.job_id.as_text() {
            Some(id) if !id.trim().is_empty() => id.trim().chars().take(JOB_ID_MAX_LEN).collect(),
            _ => synthesize_job_id(raw, &username, document_id, timestamp.timestamp_millis()),
        };

        let printer = PrinterKey::parse(&raw.param5.as_text().unwrap_or_default())?;

        Ok(Self {
            document_id,
            document_name: raw.param2.as_text().unwrap_or_default(),
            username,
            byte_size,
            pages,
            timestamp,
            job_id,
            printer,
            computer: raw
                .param4
                .as_text()
                .and_then(|s| EndpointKey::parse_computer(&s)),
            port: raw.param6.as_text().and_then(|s| EndpointKey::parse_port(&s)),
        })
    }
}

/// Decodes `/Date(<epoch-ms>)/` (or a bare millisecond count) to UTC.
/// An absent value decodes to the Unix epoch.
pub fn decode_time_created(value: Option<&LooseValue>) -> Result<DateTime<Utc>, ParseError> {
    let millis = match value {
        None | Some(LooseValue::Null) => 0,
        Some(LooseValue::Int(ms)) => *ms,
        Some(LooseValue::Float(ms)) if ms.is_finite() => ms.trunc() as i64,
        Some(LooseValue::Text(s)) => {
            let inner = s
                .trim()
                .trim_start_matches("/Date(")
                .trim_end_matches(")/")
                .trim();
            inner
                .parse()
                .map_err(|_| ParseError::InvalidTimestamp(s.clone()))?
        }
        Some(other) => {
            return Err(ParseError::InvalidTimestamp(
                other.as_text().unwrap_or_default(),
            ))
        }
    };

    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ParseError::InvalidTimestamp(millis.to_string()))
}

/// Deterministic surrogate for a record without `JobID`.
///
/// Two distinct jobs identical in every identifying field and millisecond
/// collapse into one.
fn synthesize_job_id(raw: &RawPrintEvent, username: &str, document_id: i64, timestamp_ms: i64) -> String {
    let payload = [
        username.to_string(),
        document_id.to_string(),
        raw.param2.as_text().unwrap_or_default(),
        raw.param4.as_text().unwrap_or_default(),
        raw.param5.as_text().unwrap_or_default(),
        raw.param6.as_text().unwrap_or_default(),
        timestamp_ms.to_string(),
    ]
    .join("|");

    let digest = hex::encode(Sha256::digest(payload.as_bytes()));
    let hash_len = JOB_ID_MAX_LEN - AUTO_JOB_ID_PREFIX.len();
    format!("{}{}", AUTO_JOB_ID_PREFIX, &digest[..hash_len])
}
