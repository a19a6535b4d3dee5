//! Transport-independent import endpoint.
//!
//! [`ImportGate`] checks the shared-secret token and payload size, then hands
//! the body to the reconciler or roster importer. An HTTP layer only has to
//! map [`RequestError::status_code`] and serialize [`ApiResponse`].

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{ImportSettings, ImportToken};
use crate::ingest::{EventReconciler, ImportReport, RosterImporter};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid or missing import token")]
    Unauthorized,

    #[error("Payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    InvalidPayload(String),
}

impl RequestError {
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::Unauthorized => 401,
            RequestError::PayloadTooLarge { .. } => 413,
            RequestError::InvalidPayload(_) => 400,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Status code and body for an import result. A report with record errors
/// is still a success.
pub fn respond(result: Result<ImportReport, RequestError>) -> (u16, ApiResponse<ImportReport>) {
    match result {
        Ok(report) => (200, ApiResponse::ok(report)),
        Err(e) => (e.status_code(), ApiResponse::err(e.to_string())),
    }
}

pub struct ImportGate {
    token: Option<ImportToken>,
    max_payload_bytes: usize,
    reconciler: EventReconciler,
    importer: RosterImporter,
}

impl ImportGate {
    pub fn new(settings: &ImportSettings, reconciler: EventReconciler, importer: RosterImporter) -> Self {
        if settings.token.is_none() {
            log::warn!("No import token configured; import requests will be refused");
        }
        Self {
            token: settings.token.clone(),
            max_payload_bytes: settings.max_payload_bytes,
            reconciler,
            importer,
        }
    }

    /// Imports a JSON array of print events.
    pub fn import_events(&self, token: Option<&str>, body: &[u8]) -> Result<ImportReport, RequestError> {
        self.authorize(token)?;
        self.check_size(body)?;
        let report = self
            .reconciler
            .import_json(body)
            .map_err(|e| RequestError::InvalidPayload(e.to_string()))?;
        log::info!(
            "Event import request: {} created, {} errors",
            report.created,
            report.errors.len()
        );
        Ok(report)
    }

    /// Imports an uploaded roster CSV.
    pub fn import_users(
        &self,
        token: Option<&str>,
        filename: &str,
        body: &[u8],
    ) -> Result<ImportReport, RequestError> {
        self.authorize(token)?;
        self.check_size(body)?;
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(RequestError::InvalidPayload(format!(
                "expected a .csv file, got '{}'",
                filename
            )));
        }
        Ok(self.importer.import_csv(body))
    }

    fn authorize(&self, presented: Option<&str>) -> Result<(), RequestError> {
        match (&self.token, presented) {
            (Some(expected), Some(presented)) if tokens_match(expected.expose(), presented) => Ok(()),
            _ => {
                log::warn!("Rejected import request with invalid token");
                Err(RequestError::Unauthorized)
            }
        }
    }

    fn check_size(&self, body: &[u8]) -> Result<(), RequestError> {
        if body.len() > self.max_payload_bytes {
            return Err(RequestError::PayloadTooLarge {
                size: body.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

/// Compares digests so the running time depends on neither the contents
/// nor the lengths of the tokens.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(presented.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
