//! Builders for upstream payloads.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Builds one upstream print-event object.
#[derive(Debug, Clone)]
pub struct PrintEventBuilder {
    document_id: Value,
    document_name: String,
    username: String,
    computer: Option<String>,
    printer: String,
    port: Option<String>,
    byte_size: Value,
    pages: Value,
    job_id: Option<String>,
    time_created: Value,
}

impl PrintEventBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            document_id: json!("7"),
            document_name: "report.pdf".to_string(),
            username: "alice".to_string(),
            computer: None,
            printer: "HP4015-B1-IT-101-1".to_string(),
            port: None,
            byte_size: json!("20480"),
            pages: json!("3"),
            job_id: Some(job_id.to_string()),
            time_created: json!("/Date(1696000000000)/"),
        }
    }

    pub fn without_job_id(mut self) -> Self {
        self.job_id = None;
        self
    }

    pub fn user(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn printer(mut self, printer: &str) -> Self {
        self.printer = printer.to_string();
        self
    }

    pub fn computer(mut self, computer: &str) -> Self {
        self.computer = Some(computer.to_string());
        self
    }

    pub fn port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    pub fn document(mut self, name: &str) -> Self {
        self.document_name = name.to_string();
        self
    }

    pub fn pages(mut self, pages: i64) -> Self {
        self.pages = json!(pages);
        self
    }

    pub fn time_ms(mut self, epoch_ms: i64) -> Self {
        self.time_created = json!(format!("/Date({})/", epoch_ms));
        self
    }

    pub fn build(self) -> Value {
        let mut event = json!({
            "Param1": self.document_id,
            "Param2": self.document_name,
            "Param3": self.username,
            "Param5": self.printer,
            "Param7": self.byte_size,
            "Param8": self.pages,
            "TimeCreated": self.time_created,
        });
        if let Some(map) = event.as_object_mut() {
            if let Some(computer) = self.computer {
                map.insert("Param4".into(), json!(computer));
            }
            if let Some(port) = self.port {
                map.insert("Param6".into(), json!(port));
            }
            if let Some(job_id) = self.job_id {
                map.insert("JobID".into(), json!(job_id));
            }
        }
        event
    }
}

/// Serializes events as a JSON array body.
pub fn events_body(events: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&Value::Array(events)).unwrap()
}

pub const ROSTER_HEADER: &str = "SamAccountName,DisplayName,OU";

/// Builds a roster CSV body from `(username, display name, OU)` rows.
pub fn roster_body(rows: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut csv = format!("{}\n", ROSTER_HEADER);
    for (username, display_name, ou) in rows {
        csv.push_str(&format!("{},{},{}\n", username, display_name, ou));
    }
    csv.into_bytes()
}
