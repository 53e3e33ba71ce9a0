//! Common test utilities and fixtures
//!
//! Provides a mock WebSocket server that behaves like the echo server the
//! client talks to in production, plus config fixture paths.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};

// ─────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

// ─────────────────────────────────────────────────────────────────
// Mock Server
// ─────────────────────────────────────────────────────────────────

/// A welcome frame as the server sends it
pub fn welcome_frame(connection_id: &str, heartbeat_interval_ms: u64) -> Value {
    json!({
        "type": "welcome",
        "message": "Connected to WebSocket server",
        "connectionId": connection_id,
        "heartbeatInterval": heartbeat_interval_ms,
    })
}

/// Behaviour of the mock server for every accepted connection
#[derive(Debug, Clone)]
pub struct MockServerOptions {
    /// Sent first; `None` for a server that never greets
    pub welcome: Option<Value>,
    /// Sent verbatim right after the welcome
    pub extra_frames: Vec<String>,
    /// Sent as binary frames after the text ones
    pub binary_frames: Vec<Vec<u8>>,
    pub reply_to_pings: bool,
    pub ack_heartbeats: bool,
    pub echo_messages: bool,
    /// Send a close frame once the greeting frames are out
    pub close_after_greeting: bool,
}

impl Default for MockServerOptions {
    fn default() -> Self {
        Self {
            welcome: Some(welcome_frame("test-connection", 20000)),
            extra_frames: Vec::new(),
            binary_frames: Vec::new(),
            reply_to_pings: true,
            ack_heartbeats: true,
            echo_messages: true,
            close_after_greeting: false,
        }
    }
}

impl MockServerOptions {
    pub fn with_welcome(connection_id: &str, heartbeat_interval_ms: u64) -> Self {
        Self {
            welcome: Some(welcome_frame(connection_id, heartbeat_interval_ms)),
            ..Default::default()
        }
    }

    /// A server that greets and then never answers anything
    pub fn silent(connection_id: &str, heartbeat_interval_ms: u64) -> Self {
        Self {
            reply_to_pings: false,
            ack_heartbeats: false,
            echo_messages: false,
            ..Self::with_welcome(connection_id, heartbeat_interval_ms)
        }
    }
}

/// Mock WebSocket server for testing
pub struct MockServer {
    addr: SocketAddr,
    shutdown_tx: Option<mpsc::Sender<()>>,
    received: Arc<RwLock<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::with_options(MockServerOptions::default()).await
    }

    pub async fn with_options(options: MockServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let received = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let received_clone = received.clone();
        let connections_clone = connections.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        if let Ok((stream, _)) = accept_result {
                            let received = received_clone.clone();
                            let options = options.clone();
                            connections_clone.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(async move {
                                if let Ok(ws_stream) = accept_async(stream).await {
                                    handle_connection(ws_stream, options, received).await;
                                }
                            });
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            received,
            connections,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/websocket", self.addr)
    }

    /// Text frames received from clients, in order
    pub fn received(&self) -> Vec<String> {
        self.received.read().clone()
    }

    /// Parsed frames whose `type` is `kind`
    pub fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received()
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter(|value| value["type"] == kind)
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Poll until `count` frames of `kind` have arrived
    pub async fn wait_for_type(&self, kind: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.received_of_type(kind).len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received_of_type(kind).len() >= count
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

async fn handle_connection<S>(ws_stream: S, options: MockServerOptions, received: Arc<RwLock<Vec<String>>>)
where
    S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<WsMessage>
        + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    if let Some(welcome) = &options.welcome {
        let _ = write.send(WsMessage::Text(welcome.to_string())).await;
    }
    for frame in &options.extra_frames {
        let _ = write.send(WsMessage::Text(frame.clone())).await;
    }
    for frame in &options.binary_frames {
        let _ = write.send(WsMessage::Binary(frame.clone())).await;
    }
    if options.close_after_greeting {
        let _ = write.send(WsMessage::Close(None)).await;
    }

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        received.write().push(text.clone());

        let parsed = serde_json::from_str::<Value>(&text).ok();
        let kind = parsed
            .as_ref()
            .and_then(|value| value.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let reply = match kind {
            "ping" if options.reply_to_pings => Some(json!({
                "type": "pong",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "connectionId": "test-connection",
            })),
            "heartbeat" if options.ack_heartbeats => Some(json!({
                "type": "heartbeat_ack",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
            "ping" | "heartbeat" => None,
            _ if options.echo_messages => {
                let message = parsed
                    .as_ref()
                    .and_then(|value| value.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or(text.as_str())
                    .to_string();
                Some(json!({
                    "type": "echo",
                    "message": message,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "connections": 1,
                    "connectionId": "test-connection",
                }))
            }
            _ => None,
        };

        if let Some(reply) = reply {
            let _ = write.send(WsMessage::Text(reply.to_string())).await;
        }
    }
}
