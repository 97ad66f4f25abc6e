//! Request/response client for a Wright server.
//!
//! Every failure, local or remote, comes back as a failed [`ActionResult`];
//! `send_action` never returns an error.

use futures::future::BoxFuture;
use tracing::{info, warn};
use wright_core::{decode_result, encode_command, ActionResult, Command, ConnectionError};

use crate::connection::{ConnectionConfig, ConnectionManager};

pub struct WrightClient {
    url: String,
    connection: ConnectionManager,
}

impl WrightClient {
    /// Validates the URL; does not connect.
    pub fn new(url: impl Into<String>) -> Result<Self, ConnectionError> {
        Self::with_config(url, ConnectionConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: ConnectionConfig) -> Result<Self, ConnectionError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConnectionError::InvalidUrl(url));
        }
        Ok(Self {
            url,
            connection: ConnectionManager::new(config),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connection.connect(&self.url).await
    }

    /// Sends `cmd` and returns the server's result.
    pub async fn send_action(&mut self, cmd: &Command) -> ActionResult {
        if !self.connection.is_open() {
            return ActionResult::failure("Client not connected.");
        }

        let payload = match encode_command(cmd) {
            Ok(payload) => payload,
            Err(e) => return ActionResult::failure(format!("Data Error: {e}")),
        };

        info!(command = %cmd, "sending command");
        match self.connection.send_and_receive(payload).await {
            Ok(reply) => match decode_result(&reply) {
                Ok(result) => {
                    info!(result = %result, "received result");
                    result
                }
                Err(e) => {
                    warn!(error = %e, "undecodable result");
                    ActionResult::failure(format!("Data Error: {e}"))
                }
            },
            Err(ConnectionError::ClosedDuringExchange(detail)) => {
                self.close().await;
                ActionResult::failure(format!(
                    "WebSocket connection closed unexpectedly: {detail}"
                ))
            }
            Err(e) => ActionResult::failure(format!("Connection error: {e}")),
        }
    }

    pub async fn close(&mut self) {
        let timeout = self.connection.config().close_timeout;
        self.connection.close(timeout).await;
    }

    /// Connects, runs `f`, and closes the connection whatever `f` returns.
    ///
    /// ```no_run
    /// # async fn demo() -> Result<(), wright_core::ConnectionError> {
    /// use wright_client::WrightClient;
    /// use wright_core::Command;
    ///
    /// let result = WrightClient::session("ws://localhost:1337", |client| {
    ///     Box::pin(async move { client.send_action(&Command::screenshot()).await })
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// If the returned future is dropped early, the transport is released when
    /// the client is dropped.
    pub async fn session<T, F>(url: impl Into<String>, f: F) -> Result<T, ConnectionError>
    where
        F: for<'a> FnOnce(&'a mut WrightClient) -> BoxFuture<'a, T>,
    {
        let mut client = WrightClient::new(url)?;
        client.connect().await?;
        let output = f(&mut client).await;
        client.close().await;
        Ok(output)
    }
}
