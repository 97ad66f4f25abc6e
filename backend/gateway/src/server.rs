//! Relay HTTP server.
//!
//! Routes WebSocket upgrades on `/` and `/ws` to the connection handler and
//! serves the health API. A single stop signal ends the listener and every
//! open connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, instrument};
use wright_core::{Dispatcher, FatalInitError};

use crate::health_api;
use crate::session_registry::ConnectionRegistry;
use crate::ws_server;

/// Transport parameters for server-side connections.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_message_size: usize,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// Upper bound for flushing queued frames once a connection ends.
    pub close_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1 << 24,
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Application state shared across routes and connections.
#[derive(Clone)]
pub struct GatewayState {
    dispatcher: Dispatcher,
    registry: ConnectionRegistry,
    config: Arc<GatewayConfig>,
    stop: Arc<watch::Sender<bool>>,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(dispatcher: Dispatcher, config: GatewayConfig) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            dispatcher,
            registry: ConnectionRegistry::new(),
            config: Arc::new(config),
            stop: Arc::new(stop),
            started_at: Instant::now(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Ask the listener and all connections to stop. Idempotent.
    pub fn shutdown(&self) {
        if !self.stop.send_replace(true) {
            info!("stop requested");
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    pub(crate) fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }
}

/// Resolves once a stop has been requested.
pub(crate) async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(ws_server::ws_handler))
        .route("/ws", get(ws_server::ws_handler))
        .route("/api/health", get(health_api::get_health))
        .route("/api/connections", get(health_api::list_connections))
        .with_state(state)
}

/// Binds `addr` and serves until [`GatewayState::shutdown`] is called.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| FatalInitError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    serve(listener, state).await
}

/// Serves on an already bound listener.
pub async fn serve(listener: TcpListener, state: GatewayState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, backend = %state.dispatcher().backend().name(), "Wright relay listening");

    let mut stop = state.stop_signal();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop_requested(&mut stop).await })
        .await?;

    info!(%addr, "Wright relay stopped accepting connections");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wright_core::MockBackend;

    fn state() -> GatewayState {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::new()));
        GatewayState::new(dispatcher, GatewayConfig::default())
    }

    #[test]
    fn test_default_config_matches_client_limits() {
        let config = GatewayConfig::default();
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.ping_timeout, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_observed() {
        let state = state();
        let mut rx = state.stop_signal();
        assert!(!state.is_stopping());

        state.shutdown();
        state.shutdown();
        assert!(state.is_stopping());
        tokio::time::timeout(Duration::from_secs(1), stop_requested(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_stop() {
        let state = state();
        state.shutdown();
        let mut rx = state.clone().stop_signal();
        tokio::time::timeout(Duration::from_secs(1), stop_requested(&mut rx))
            .await
            .unwrap();
    }
}
