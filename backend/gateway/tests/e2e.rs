//! End-to-end relay tests: a real gateway on an ephemeral port, driven by
//! `WrightClient` and raw WebSocket peers, executing against `MockBackend`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use wright_client::{ConnectionConfig, WrightClient};
use wright_core::{
    ActionType, AutomationBackend, BackendCall, Command, Dispatcher, MockBackend, decode_result,
    encode_command,
};
use wright_gateway::{GatewayConfig, GatewayState, serve};

struct Relay {
    addr: SocketAddr,
    url: String,
    backend: Arc<MockBackend>,
    state: GatewayState,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_relay(config: GatewayConfig) -> Relay {
    let backend = Arc::new(MockBackend::new());
    backend.initialize().await.unwrap();
    let state = GatewayState::new(Dispatcher::new(backend.clone()), config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(serve(listener, state.clone()));

    Relay {
        addr,
        url: format!("ws://{addr}/"),
        backend,
        state,
        handle,
    }
}

fn fast_heartbeat() -> GatewayConfig {
    GatewayConfig {
        ping_interval: Duration::from_millis(50),
        ping_timeout: Duration::from_millis(50),
        ..GatewayConfig::default()
    }
}

async fn connected_client(url: &str) -> WrightClient {
    let mut client = WrightClient::new(url).unwrap();
    client.connect().await.unwrap();
    client
}

async fn get_json(addr: SocketAddr, path: &str) -> serde_json::Value {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");
    serde_json::from_str(body).unwrap()
}

/// Polls the health endpoint until `connections` equals `expected`.
async fn wait_for_connections(addr: SocketAddr, expected: u64) {
    for _ in 0..100 {
        if get_json(addr, "/api/health").await["connections"] == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connection count never reached {expected}");
}

#[tokio::test]
async fn test_goto_succeeds() {
    let relay = start_relay(GatewayConfig::default()).await;
    let mut client = connected_client(&relay.url).await;

    let result = client.send_action(&Command::goto("https://example.com")).await;
    assert!(result.success, "{result}");
    assert!(result.image.is_none());
    assert_eq!(
        relay.backend.calls(),
        vec![BackendCall::Navigate(
            "https://example.com".into(),
            Duration::from_millis(30_000)
        )]
    );
    client.close().await;
}

#[tokio::test]
async fn test_screenshot_returns_exact_bytes() {
    let relay = start_relay(GatewayConfig::default()).await;
    let image: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
    relay.backend.set_screenshot(image.clone());

    let result = WrightClient::session(relay.url.clone(), |client| {
        Box::pin(async move { client.send_action(&Command::screenshot()).await })
    })
    .await
    .unwrap();

    assert!(result.success, "{result}");
    assert_eq!(result.image.as_ref().map(Vec::len), Some(1024));
    assert_eq!(result.image, Some(image));
}

#[tokio::test]
async fn test_click_without_coordinates_never_reaches_backend() {
    let relay = start_relay(GatewayConfig::default()).await;
    let mut client = connected_client(&relay.url).await;

    let result = client.send_action(&Command::new(ActionType::Click)).await;
    assert!(!result.success);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Missing x or y for click action")
    );
    assert!(relay.backend.calls().is_empty());

    // The connection is still usable.
    let result = client.send_action(&Command::click(10.0, 20.0)).await;
    assert!(result.success, "{result}");
    assert_eq!(relay.backend.calls(), vec![BackendCall::Click(10.0, 20.0)]);
    client.close().await;
}

#[tokio::test]
async fn test_malformed_payload_keeps_connection_open() {
    let relay = start_relay(GatewayConfig::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(relay.url.as_str())
        .await
        .unwrap();

    ws.send(Message::Binary(b"not json".to_vec())).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap().into_data();
    let result = decode_result(&reply).unwrap();
    assert!(!result.success);
    assert!(
        result
            .error_message
            .unwrap()
            .starts_with("Action deserialization error: ")
    );

    let payload = encode_command(&Command::screenshot()).unwrap();
    ws.send(Message::Binary(payload)).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap().into_data();
    let result = decode_result(&reply).unwrap();
    assert!(result.success, "{result}");
    assert!(result.has_image());
}

#[tokio::test]
async fn test_text_frames_are_accepted() {
    let relay = start_relay(GatewayConfig::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(relay.url.as_str())
        .await
        .unwrap();

    ws.send(Message::Text(r#"{"action_type": "scroll"}"#.into()))
        .await
        .unwrap();
    let reply = ws.next().await.unwrap().unwrap().into_data();
    assert!(decode_result(&reply).unwrap().success);
    assert_eq!(relay.backend.calls(), vec![BackendCall::ScrollBy(0, 0)]);
}

#[tokio::test]
async fn test_uninitialized_backend_is_reported() {
    let relay = start_relay(GatewayConfig::default()).await;
    relay.backend.shutdown().await;
    let mut client = connected_client(&relay.url).await;

    let result = client.send_action(&Command::goto("https://example.com")).await;
    assert_eq!(
        result.error_message.as_deref(),
        Some("Mock browser is not initialized.")
    );

    let health = get_json(relay.addr, "/api/health").await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["backend_ready"], false);
    client.close().await;
}

#[tokio::test]
async fn test_health_reports_backend_and_connections() {
    let relay = start_relay(GatewayConfig::default()).await;

    let health = get_json(relay.addr, "/api/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["backend"], "Mock browser");
    assert_eq!(health["backend_ready"], true);
    assert_eq!(health["connections"], 0);

    let mut client = connected_client(&relay.url).await;
    wait_for_connections(relay.addr, 1).await;
    let listed = get_json(relay.addr, "/api/connections").await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    client.close().await;
    wait_for_connections(relay.addr, 0).await;
}

#[tokio::test]
async fn test_ws_path_alias() {
    let relay = start_relay(GatewayConfig::default()).await;
    let mut client = connected_client(&format!("ws://{}/ws", relay.addr)).await;
    assert!(client.send_action(&Command::screenshot()).await.success);
    client.close().await;
}

#[tokio::test]
async fn test_connections_are_independent() {
    let relay = start_relay(GatewayConfig::default()).await;
    let mut a = connected_client(&relay.url).await;
    let mut b = connected_client(&relay.url).await;

    let typing = Command::type_text("hello");
    let resize = Command::set_viewport_size(1280, 720);
    let (ra, rb) = tokio::join!(a.send_action(&typing), b.send_action(&resize));
    assert!(ra.success, "{ra}");
    assert!(rb.success, "{rb}");

    // Dropping one peer abruptly leaves the other served.
    drop(a);
    let rb = b.send_action(&Command::screenshot()).await;
    assert!(rb.success, "{rb}");
    b.close().await;
}

#[tokio::test]
async fn test_slow_action_survives_heartbeat() {
    let relay = start_relay(fast_heartbeat()).await;
    relay.backend.set_delay(Duration::from_millis(300));

    let config = ConnectionConfig {
        ping_interval: Duration::from_millis(50),
        ping_timeout: Duration::from_millis(50),
        ..ConnectionConfig::default()
    };
    let mut client = WrightClient::with_config(relay.url.clone(), config).unwrap();
    client.connect().await.unwrap();

    let result = client.send_action(&Command::screenshot()).await;
    assert!(result.success, "{result}");
    assert!(client.is_connected());
    client.close().await;
}

#[tokio::test]
async fn test_idle_client_survives_server_heartbeat() {
    let relay = start_relay(fast_heartbeat()).await;
    let mut client = connected_client(&relay.url).await;

    let first = client.send_action(&Command::screenshot()).await;
    assert!(first.success, "{first}");

    // Ten server heartbeat periods with nothing in flight.
    tokio::time::sleep(Duration::from_millis(500)).await;
    wait_for_connections(relay.addr, 1).await;
    assert!(client.is_connected());

    let second = client.send_action(&Command::screenshot()).await;
    assert!(second.success, "{second}");
    client.close().await;
}

#[tokio::test]
async fn test_silent_peer_is_dropped_by_heartbeat() {
    let relay = start_relay(fast_heartbeat()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(relay.url.as_str())
        .await
        .unwrap();

    // Not polling the stream means pings go unanswered.
    tokio::time::sleep(Duration::from_millis(400)).await;
    wait_for_connections(relay.addr, 0).await;

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test]
async fn test_stop_closes_connections_with_going_away() {
    let relay = start_relay(GatewayConfig::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(relay.url.as_str())
        .await
        .unwrap();
    wait_for_connections(relay.addr, 1).await;

    relay.state.shutdown();

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected close frame, got {other:?}"),
    }

    let served = tokio::time::timeout(Duration::from_secs(5), relay.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(served.is_ok());
    assert!(TcpStream::connect(relay.addr).await.is_err());
}
