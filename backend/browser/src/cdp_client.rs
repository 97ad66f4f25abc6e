//! Chrome DevTools Protocol Client
//!
//! Holds the WebSocket to a running Chromium and correlates JSON-RPC commands
//! with their responses. Events are fanned out on a broadcast channel so page
//! code can wait for lifecycle notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::BrowserError;

/// Timeout for CDP commands that have no operation-specific deadline.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_BUFFER: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>;

/// A CDP event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    /// Set for events raised inside an attached target session.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<CdpResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
}

pub struct CdpClient {
    ws_endpoint: String,
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<SplitSink<WsStream, Message>>,
    events: broadcast::Sender<CdpEvent>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl CdpClient {
    /// Attaches onto the Chrome endpoint (`ws://host:port/devtools/...`).
    pub async fn connect(ws_endpoint: &str) -> Result<Self, BrowserError> {
        info!(url = ws_endpoint, "connecting to CDP websocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_endpoint)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let (writer, reader) = ws_stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            events.clone(),
            Arc::clone(&connected),
        ));

        info!(url = ws_endpoint, "CDP websocket connection established");

        Ok(Self {
            ws_endpoint: ws_endpoint.to_string(),
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            events,
            connected,
            reader,
        })
    }

    pub fn ws_endpoint(&self) -> &str {
        &self.ws_endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to browser events. Subscribe before issuing the command
    /// whose events you want, or they may be missed.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Dispatches one command and waits for its response.
    ///
    /// `session_id` routes the command to an attached target when the client
    /// is connected to the browser endpoint.
    pub async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        if !self.is_connected() {
            return Err(BrowserError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = serde_json::json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(session_id) = session_id {
            message["sessionId"] = Value::String(session_id.to_string());
        }

        debug!(id, method, "sending CDP command");

        // Register before sending so a fast response cannot be missed.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = {
            let mut writer = self.writer.lock().await;
            writer.send(Message::Text(message.to_string())).await
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(BrowserError::Protocol(format!(
                "failed to send {method}: {e}"
            )));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(BrowserError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BrowserError::Timeout {
                    operation: method.to_string(),
                    duration: timeout,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(BrowserError::Cdp {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Closes the socket and stops the reader.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "CDP websocket close failed");
        }
        self.reader.abort();
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: SplitStream<WsStream>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg) = reader.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Binary(b)) => match String::from_utf8(b) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => {
                info!("CDP websocket closed by browser");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "CDP websocket read error, stopping reader");
                break;
            }
        };

        let json: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to parse CDP message");
                continue;
            }
        };

        if let Some(response) = parse_cdp_response(&json) {
            if let Some(tx) = pending.lock().await.remove(&response.id) {
                let _ = tx.send(response);
            } else {
                debug!(id = response.id, "response for unknown command id");
            }
        } else if let Some(event) = parse_cdp_event(&json) {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with ConnectionClosed.
    pending.lock().await.clear();
}

pub fn parse_cdp_response(json: &Value) -> Option<CdpResponse> {
    let id = json.get("id")?.as_u64()?;
    Some(CdpResponse {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

pub fn parse_cdp_event(json: &Value) -> Option<CdpEvent> {
    let method = json.get("method")?.as_str()?;
    Some(CdpEvent {
        method: method.to_string(),
        params: json.get("params").cloned().unwrap_or(Value::Null),
        session_id: json
            .get("sessionId")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Turn a remote-debugging address into a DevTools WebSocket URL.
///
/// `ws://` and `wss://` URLs are used as given; for `http(s)://` the browser's
/// `/json/version` document is fetched.
pub async fn resolve_ws_endpoint(endpoint: &str) -> Result<String, BrowserError> {
    let url = Url::parse(endpoint).map_err(|_| BrowserError::InvalidEndpoint(endpoint.into()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(endpoint.to_string()),
        "http" | "https" => {
            let version_url = url
                .join("/json/version")
                .map_err(|e| BrowserError::Discovery(e.to_string()))?;
            info!(url = %version_url, "resolving DevTools websocket url");
            let info: VersionInfo = reqwest::get(version_url)
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| BrowserError::Discovery(e.to_string()))?
                .json()
                .await
                .map_err(|e| BrowserError::Discovery(e.to_string()))?;
            Ok(info.web_socket_debugger_url)
        }
        _ => Err(BrowserError::InvalidEndpoint(endpoint.into())),
    }
}

/// Whether the URL addresses one page directly rather than the browser.
pub fn is_page_endpoint(ws_endpoint: &str) -> bool {
    ws_endpoint.contains("/devtools/page/")
}
