//! WebSocket entrypoint and connection handler.
//!
//! Each connection runs three tasks: a reader that also drives the heartbeat
//! and watches the stop signal, a worker that executes commands strictly one
//! at a time, and a writer that owns the socket's sending half.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant as TokioInstant, interval_at, sleep_until};
use tracing::{debug, error, info, warn};
use wright_core::{ActionResult, Dispatcher, decode_command, encode_result};
use wright_logging::{ActionEvent, ActionEventLogger};

use crate::server::{GatewayState, stop_requested};
use crate::session_registry::ConnectionInfo;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    let limit = state.config().max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_connection(socket, peer, state))
}

async fn handle_connection(socket: WebSocket, peer: SocketAddr, state: GatewayState) {
    let info = ConnectionInfo::new(peer);
    let conn_id = info.id.clone();
    state.registry().register(info).await;
    info!(%peer, connection_id = %conn_id, "client connected");

    let (mut sender, receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (work_tx, work_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    // Writer: a failed send ends this connection only.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sender.send(msg).await {
                debug!(error = %e, "send failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let work_task = tokio::spawn(run_worker(
        conn_id.clone(),
        state.dispatcher().clone(),
        work_rx,
        tx.clone(),
    ));

    let mut recv_task = tokio::spawn(read_loop(receiver, work_tx, tx, state.clone()));

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            work_task.abort();
        }
        _ = (&mut recv_task) => {
            work_task.abort();
            // Let the writer flush what is queued, e.g. a close frame.
            let flush = tokio::time::timeout(state.config().close_timeout, &mut send_task);
            if flush.await.is_err() {
                send_task.abort();
            }
        }
    }

    state.registry().unregister(&conn_id).await;
    info!(%peer, connection_id = %conn_id, "client disconnected");
}

async fn read_loop(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    work_tx: mpsc::UnboundedSender<Vec<u8>>,
    tx: mpsc::UnboundedSender<Message>,
    state: GatewayState,
) {
    let config = state.config().clone();
    let mut stop = state.stop_signal();
    let mut ping = interval_at(
        TokioInstant::now() + config.ping_interval,
        config.ping_interval,
    );
    let mut pong_deadline: Option<TokioInstant> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Binary(bytes))) => {
                    if work_tx.send(bytes).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if work_tx.send(text.into_bytes()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer sent close");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive error");
                    break;
                }
                None => break,
            },
            _ = ping.tick() => {
                if pong_deadline.is_none() {
                    if tx.send(Message::Ping(Vec::new())).is_err() {
                        break;
                    }
                    pong_deadline = Some(TokioInstant::now() + config.ping_timeout);
                }
            }
            _ = pong_expired(pong_deadline) => {
                warn!("keepalive ping timeout, dropping connection");
                break;
            }
            _ = stop_requested(&mut stop) => {
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "Server shutting down".into(),
                })));
                break;
            }
        }
    }
}

async fn pong_expired(deadline: Option<TokioInstant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Executes payloads in arrival order and queues one reply per payload.
async fn run_worker(
    conn_id: String,
    dispatcher: Dispatcher,
    mut work_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    tx: mpsc::UnboundedSender<Message>,
) {
    while let Some(payload) = work_rx.recv().await {
        let result = process_payload(&conn_id, &dispatcher, &payload).await;
        let Some(reply) = reply_bytes(&result) else {
            break;
        };
        if tx.send(Message::Binary(reply)).is_err() {
            break;
        }
    }
}

/// Decodes one inbound payload and runs it. Never fails: every problem
/// becomes a failed result.
pub async fn process_payload(conn_id: &str, dispatcher: &Dispatcher, payload: &[u8]) -> ActionResult {
    let cmd = match decode_command(payload) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!(connection_id = %conn_id, error = %e, "failed to decode command");
            ActionEventLogger::log_event(
                conn_id,
                ActionEvent::Rejected {
                    error_msg: e.to_string(),
                },
            );
            return ActionResult::failure(format!("Action deserialization error: {e}"));
        }
    };

    ActionEventLogger::log_event(
        conn_id,
        ActionEvent::Received {
            action: cmd.action_type.to_string(),
            params: cmd
                .params()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        },
    );

    let started = Instant::now();
    let result = dispatcher.dispatch(&cmd).await;

    ActionEventLogger::log_event(
        conn_id,
        ActionEvent::Completed {
            action: cmd.action_type.to_string(),
            success: result.success,
            has_image: result.has_image(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            error_msg: result.error_message.clone(),
        },
    );
    result
}

fn reply_bytes(result: &ActionResult) -> Option<Vec<u8>> {
    match encode_result(result) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(error = %e, "failed to encode result");
            encode_result(&ActionResult::failure(format!("Server execution error: {e}"))).ok()
        }
    }
}
