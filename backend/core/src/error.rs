use std::time::Duration;

use thiserror::Error;

/// A wire payload that could not be turned into a command or result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Failed to decode JSON: {0}")]
    InvalidJson(String),

    #[error("Missing 'action_type' in message")]
    MissingActionType,

    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    #[error("Invalid field in message: {0}")]
    InvalidField(String),

    #[error("Failed to decode base64 image data: {0}")]
    InvalidImage(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Transport-level failures surfaced by the connection manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Invalid WebSocket URL provided: {0}")]
    InvalidUrl(String),

    #[error("connection refused by {url}: {reason}")]
    Refused { url: String, reason: String },

    #[error("connection reset: {0}")]
    Reset(String),

    #[error("connection closed during exchange: {0}")]
    ClosedDuringExchange(String),

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    #[error("not connected")]
    NotConnected,

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("transport error: {0}")]
    Transport(String),
}

/// A command that is missing a field its action requires.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing 'url' for goto action")]
    MissingUrl,

    #[error("Missing x or y for click action")]
    MissingCoordinates,

    #[error("Missing text for type action")]
    MissingText,

    #[error("Missing width or height for set_viewport_size action")]
    MissingViewportSize,
}

/// Failure reported by an automation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not initialized")]
    NotInitialized,

    #[error("{0}")]
    Operation(String),

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("backend connection failed: {0}")]
    Connection(String),
}

/// Startup failure that ends the process.
#[derive(Debug, Error)]
pub enum FatalInitError {
    #[error("failed to initialize {backend} backend: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
