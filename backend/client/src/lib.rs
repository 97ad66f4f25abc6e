//! Client side of the Wright relay: a managed WebSocket connection and the
//! request/response client built on it.

pub mod client;
pub mod connection;

pub use client::WrightClient;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
