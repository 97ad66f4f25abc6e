//! Managed WebSocket connection.
//!
//! [`ConnectionManager`] owns at most one transport and walks it through an
//! explicit state machine:
//!
//! ```text
//! Unconnected -> Connecting -> Open -> Closing -> Closed
//!                    |           |                  ^
//!                    v           +---- (abrupt) ----+
//!               Unconnected
//! ```
//!
//! While open, a background task owns the socket. It answers the peer's pings,
//! sends its own heartbeat, and completes a close the peer starts, so an idle
//! connection stays alive between commands.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use wright_core::ConnectionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 16 MiB, enough for full-page JPEG captures.
pub const MAX_MESSAGE_SIZE: usize = 1 << 24;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_message_size: usize,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

enum Outbound {
    Payload(Vec<u8>),
    Close,
}

enum Inbound {
    Reply(Vec<u8>),
    /// The transport is gone; carries what ended it.
    Ended(String),
}

/// Channels to the task that owns an open socket.
struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    link: Option<Link>,
    url: Option<String>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Unconnected);
        Self {
            config,
            state: Arc::new(state),
            link: None,
            url: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && self.link.is_some()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Opens the transport. Returns immediately if already open.
    pub async fn connect(&mut self, url: &str) -> Result<(), ConnectionError> {
        if self.is_open() {
            debug!(url, "already connected");
            return Ok(());
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConnectionError::InvalidUrl(url.to_string()));
        }

        // A transport left over from an abrupt close is released first.
        self.release();
        self.set_state(ConnectionState::Connecting);
        info!(url, "attempting WebSocket connection");

        let ws_config = WebSocketConfig {
            max_message_size: Some(self.config.max_message_size),
            max_frame_size: Some(self.config.max_message_size),
            ..Default::default()
        };
        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), true),
        )
        .await;

        match attempt {
            Ok(Ok((ws, _response))) => {
                let (outbound, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound) = mpsc::unbounded_channel();
                self.set_state(ConnectionState::Open);
                let task = tokio::spawn(run_link(
                    ws,
                    outbound_rx,
                    inbound_tx,
                    Arc::clone(&self.state),
                    self.config.clone(),
                ));
                self.link = Some(Link {
                    outbound,
                    inbound,
                    task,
                });
                self.url = Some(url.to_string());
                info!(url, "connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Unconnected);
                warn!(url, error = %e, "WebSocket connection failed");
                Err(connect_error(url, e))
            }
            Err(_) => {
                self.set_state(ConnectionState::Unconnected);
                warn!(url, "WebSocket connection timed out");
                Err(ConnectionError::Timeout {
                    operation: "connect",
                    duration: self.config.connect_timeout,
                })
            }
        }
    }

    /// Sends one payload and waits for exactly one reply.
    pub async fn send_and_receive(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ConnectionError> {
        if self.state() != ConnectionState::Open {
            return Err(ConnectionError::NotConnected);
        }
        if payload.len() > self.config.max_message_size {
            return Err(ConnectionError::MessageTooLarge {
                size: payload.len(),
                limit: self.config.max_message_size,
            });
        }
        let Some(link) = self.link.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };

        let outcome = exchange(link, payload).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "connection closed during exchange");
            self.finish_link().await;
        }
        outcome
    }

    /// Orderly close, bounded by `timeout`. A no-op when nothing is open.
    pub async fn close(&mut self, timeout: Duration) {
        let Some(mut link) = self.link.take() else {
            if self.state() != ConnectionState::Unconnected {
                self.set_state(ConnectionState::Closed);
            }
            return;
        };
        if self.state() != ConnectionState::Open {
            link.task.abort();
            self.set_state(ConnectionState::Closed);
            return;
        }

        self.set_state(ConnectionState::Closing);
        let url = self.url.as_deref().unwrap_or_default();
        debug!(url, "closing WebSocket connection");

        let _ = link.outbound.send(Outbound::Close);
        match tokio::time::timeout(timeout, &mut link.task).await {
            Ok(_) => info!(url, "WebSocket connection closed"),
            Err(_) => {
                warn!(url, ?timeout, "timeout waiting for WebSocket close, releasing");
                link.task.abort();
            }
        }
        self.set_state(ConnectionState::Closed);
    }

    /// Waits for the socket task to wind down after the transport ended.
    async fn finish_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            if tokio::time::timeout(self.config.close_timeout, &mut link.task)
                .await
                .is_err()
            {
                link.task.abort();
            }
        }
        self.set_state(ConnectionState::Closed);
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            link.task.abort();
            debug!("released transport");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release();
    }
}

async fn exchange(link: &mut Link, payload: Vec<u8>) -> Result<Vec<u8>, ConnectionError> {
    // A reply whose exchange was abandoned must not answer this one.
    while let Ok(stale) = link.inbound.try_recv() {
        match stale {
            Inbound::Reply(bytes) => debug!(bytes = bytes.len(), "discarding unclaimed reply"),
            Inbound::Ended(detail) => return Err(ConnectionError::ClosedDuringExchange(detail)),
        }
    }

    if link.outbound.send(Outbound::Payload(payload)).is_err() {
        return Err(task_gone());
    }
    match link.inbound.recv().await {
        Some(Inbound::Reply(bytes)) => Ok(bytes),
        Some(Inbound::Ended(detail)) => Err(ConnectionError::ClosedDuringExchange(detail)),
        None => Err(task_gone()),
    }
}

fn task_gone() -> ConnectionError {
    ConnectionError::ClosedDuringExchange("connection task ended".to_string())
}

/// Owns the socket while the connection is open.
async fn run_link(
    mut ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
    state: Arc<watch::Sender<ConnectionState>>,
    config: ConnectionConfig,
) {
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    let mut pong_deadline: Option<Instant> = None;

    let ended = loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Payload(bytes)) => {
                    if let Err(e) = ws.send(Message::Binary(bytes)).await {
                        break transport_detail(e);
                    }
                }
                Some(Outbound::Close) => {
                    close_handshake(&mut ws).await;
                    return;
                }
                None => return,
            },
            msg = ws.next() => match msg {
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = inbound.send(Inbound::Reply(bytes));
                }
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(Inbound::Reply(text.into_bytes()));
                }
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                // Pongs to the peer's pings are queued by tungstenite and
                // flushed on the next read.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let detail = frame
                        .map(|f| format!("{} (Code: {})", f.reason, u16::from(f.code)))
                        .unwrap_or_else(|| "no close frame".to_string());
                    info!(detail, "peer closed the connection");
                    state.send_replace(ConnectionState::Closing);
                    finish_peer_close(&mut ws, config.close_timeout).await;
                    break detail;
                }
                Some(Err(e)) => break transport_detail(e),
                None => break "connection ended".to_string(),
            },
            _ = ping.tick() => {
                if pong_deadline.is_none() {
                    if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                        break transport_detail(e);
                    }
                    pong_deadline = Some(Instant::now() + config.ping_timeout);
                }
            }
            _ = pong_expired(pong_deadline) => {
                break "keepalive ping timeout".to_string();
            }
        }
    };

    state.send_replace(ConnectionState::Closed);
    let _ = inbound.send(Inbound::Ended(ended));
}

async fn pong_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Client-initiated close: send our frame and drain until the peer answers.
async fn close_handshake(ws: &mut WsStream) {
    let handshake = async {
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "Client closing".into(),
        }))
        .await?;
        while let Some(msg) = ws.next().await {
            msg?;
        }
        Ok::<(), tungstenite::Error>(())
    };
    match handshake.await {
        Ok(()) | Err(tungstenite::Error::ConnectionClosed) => {}
        Err(e) => debug!(error = %e, "close handshake ended with error"),
    }
}

/// Peer-initiated close: flush the queued close reply, then wait for the
/// peer to drop the socket.
async fn finish_peer_close(ws: &mut WsStream, timeout: Duration) {
    let reply = async {
        ws.flush().await?;
        while let Some(msg) = ws.next().await {
            msg?;
        }
        Ok::<(), tungstenite::Error>(())
    };
    match tokio::time::timeout(timeout, reply).await {
        Ok(Ok(())) | Ok(Err(tungstenite::Error::ConnectionClosed)) => {
            debug!("close reply sent")
        }
        Ok(Err(e)) => debug!(error = %e, "close reply ended with error"),
        Err(_) => warn!(?timeout, "timeout completing peer close"),
    }
}

fn connect_error(url: &str, err: tungstenite::Error) -> ConnectionError {
    match err {
        tungstenite::Error::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            ConnectionError::Refused {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
        tungstenite::Error::Http(response) => ConnectionError::Refused {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        },
        tungstenite::Error::Io(e) => ConnectionError::Reset(e.to_string()),
        other => ConnectionError::Transport(other.to_string()),
    }
}

/// Any transport failure while open means the connection is gone.
fn transport_detail(err: tungstenite::Error) -> String {
    match err {
        tungstenite::Error::Capacity(e) => format!("oversized message: {e}"),
        other => other.to_string(),
    }
}
