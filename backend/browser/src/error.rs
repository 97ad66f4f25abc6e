//! Error types for the CDP backend.

use std::time::Duration;

use thiserror::Error;
use wright_core::BackendError;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to establish a WebSocket connection to Chrome DevTools.
    #[error("failed to connect to Chrome DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("invalid DevTools endpoint '{0}': expected ws://, wss://, http:// or https://")]
    InvalidEndpoint(String),

    /// `/json/version` lookup for an HTTP endpoint failed.
    #[error("DevTools endpoint discovery failed: {0}")]
    Discovery(String),

    /// A CDP command returned an error response.
    #[error("CDP error {code}: {message}")]
    Cdp { code: i64, message: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Unexpected message shape, or a failed socket write.
    #[error("CDP protocol error: {0}")]
    Protocol(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("DevTools connection closed")]
    ConnectionClosed,
}

impl From<BrowserError> for BackendError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Timeout {
                operation,
                duration,
            } => BackendError::Timeout {
                operation,
                duration,
            },
            BrowserError::ConnectionFailed { .. }
            | BrowserError::InvalidEndpoint(_)
            | BrowserError::Discovery(_)
            | BrowserError::ConnectionClosed => BackendError::Connection(err.to_string()),
            other => BackendError::Operation(other.to_string()),
        }
    }
}
