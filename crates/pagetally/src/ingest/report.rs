use serde::Serialize;

/// Aggregated outcome of one import call.
///
/// `errors` also carries non-fatal warnings (auto-created users); a report
/// with errors is still a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: u64,
    pub updated: u64,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
