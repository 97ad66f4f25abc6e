//! Structured logging for the Wright relay.
//!
//! Subscriber setup with optional NDJSON file rotation, secret redaction, and
//! per-action event lines.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{ActionEvent, ActionEventLogger, EventLogEntry};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
