//! Wright Gateway
//!
//! Accepts WebSocket connections, executes each received command against the
//! shared automation backend, and replies with one result per command.

pub mod health_api;
pub mod server;
pub mod session_registry;
pub mod ws_server;

pub use server::{router, serve, start_server, GatewayConfig, GatewayState};
pub use session_registry::{ConnectionInfo, ConnectionRegistry};
