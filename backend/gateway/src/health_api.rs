//! Gateway Health API
//!
//! Reports backend readiness and the number of open relay connections.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::GatewayState;
use crate::session_registry::ConnectionInfo;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `"ok"` when the backend is ready, `"degraded"` otherwise.
    pub status: &'static str,
    pub backend: String,
    pub backend_ready: bool,
    pub connections: usize,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Handler for `GET /api/health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthReport> {
    let backend = state.dispatcher().backend();
    let backend_ready = backend.is_ready().await;

    Json(HealthReport {
        status: if backend_ready { "ok" } else { "degraded" },
        backend: backend.name().to_string(),
        backend_ready,
        connections: state.registry().count().await,
        uptime_seconds: state.uptime().as_secs(),
        timestamp: Utc::now(),
    })
}

/// Handler for `GET /api/connections`
pub async fn list_connections(State(state): State<GatewayState>) -> Json<Vec<ConnectionInfo>> {
    Json(state.registry().list().await)
}
