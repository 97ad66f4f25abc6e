//! Action Event Logger
//!
//! One structured line per command a connection receives and completes,
//! emitted under the `wright_actions` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvent {
    Received {
        action: String,
        params: Vec<(String, String)>,
    },
    Completed {
        action: String,
        success: bool,
        has_image: bool,
        elapsed_ms: u64,
        error_msg: Option<String>,
    },
    Rejected {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub connection_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ActionEvent,
}

pub struct ActionEventLogger;

impl ActionEventLogger {
    /// Redacts the event's free-form strings and hands it to `tracing`.
    pub fn log_event(connection_id: &str, event: ActionEvent) {
        let entry = Self::entry(connection_id, event);
        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "wright_actions", event = %json, "action event");
    }

    /// Build the redacted log entry without emitting it.
    pub fn entry(connection_id: &str, mut event: ActionEvent) -> EventLogEntry {
        match &mut event {
            ActionEvent::Received { params, .. } => {
                for (_, value) in params.iter_mut() {
                    *value = redact_sensitive_data(value);
                }
            }
            ActionEvent::Completed { error_msg, .. } => {
                if let Some(msg) = error_msg {
                    *msg = redact_sensitive_data(msg);
                }
            }
            ActionEvent::Rejected { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
        }

        EventLogEntry {
            connection_id: connection_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_params_are_redacted() {
        let entry = ActionEventLogger::entry(
            "conn-1",
            ActionEvent::Received {
                action: "goto".into(),
                params: vec![("url".into(), "https://u:p@example.com/".into())],
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "received");
        assert_eq!(json["event"]["params"][0][1], "https://[REDACTED]@example.com/");
        assert_eq!(json["connection_id"], "conn-1");
    }
}
