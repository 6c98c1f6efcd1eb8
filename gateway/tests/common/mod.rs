//! Shared helpers for the socket-level tests.
//!
//! The server runs in-process on an ephemeral port. The realtime upstream is
//! replaced by [`ChannelConnector`], which hands each connection's far ends to
//! the test through [`UpstreamHandle`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use callbridge_gateway::core::bridge::UplinkPolicy;
use callbridge_gateway::core::orders::OrderStore;
use callbridge_gateway::core::realtime::{
    ClientEvent, RealtimeConnector, RealtimeError, RealtimeLink, RealtimeResult, ServerEvent,
};
use callbridge_gateway::core::vad::VadProfiles;
use callbridge_gateway::{AppState, ServerConfig, create_app};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal configuration for tests; no environment is read.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        public_url: None,
        openai_api_key: Some("sk-test".to_string()),
        realtime_url: "wss://api.openai.com/v1/realtime".to_string(),
        realtime_model: "gpt-4o-realtime-preview".to_string(),
        realtime_voice: "alloy".to_string(),
        assistant_instructions: None,
        realtime_connect_timeout_ms: 500,
        uplink_policy: UplinkPolicy::AlwaysForward,
        playback_queue_frames: 500,
        registry_ttl_seconds: 3600,
        max_concurrent_calls: None,
        vad: VadProfiles::default(),
        order_store_url: None,
        order_store_timeout_ms: 5000,
    }
}

// =============================================================================
// Upstream doubles
// =============================================================================

/// The test's side of one upstream connection.
pub struct UpstreamHandle {
    /// Commands the bridge sent upstream
    pub commands: mpsc::Receiver<ClientEvent>,
    /// Inject server events into the bridge
    pub events: mpsc::Sender<ServerEvent>,
}

impl UpstreamHandle {
    pub async fn next_command(&mut self) -> ClientEvent {
        tokio::time::timeout(RECV_TIMEOUT, self.commands.recv())
            .await
            .expect("timed out waiting for upstream command")
            .expect("upstream command channel closed")
    }

    pub async fn send(&self, event: Value) {
        let event: ServerEvent = serde_json::from_value(event).unwrap();
        self.events.send(event).await.unwrap();
    }
}

/// Opens an in-memory link per call and hands the far ends to the test.
pub struct ChannelConnector {
    handles: mpsc::UnboundedSender<UpstreamHandle>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UpstreamHandle>) {
        let (handles, rx) = mpsc::unbounded_channel();
        (Self { handles }, rx)
    }
}

#[async_trait]
impl RealtimeConnector for ChannelConnector {
    async fn connect(&self) -> RealtimeResult<RealtimeLink> {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);
        self.handles
            .send(UpstreamHandle {
                commands: cmd_rx,
                events: event_tx,
            })
            .map_err(|_| RealtimeError::NotConnected)?;
        Ok(RealtimeLink::new(cmd_tx, event_rx))
    }
}

/// Always fails to connect.
pub struct RefusingConnector;

#[async_trait]
impl RealtimeConnector for RefusingConnector {
    async fn connect(&self) -> RealtimeResult<RealtimeLink> {
        Err(RealtimeError::ConnectionFailed("connection refused".to_string()))
    }
}

pub async fn next_handle(handles: &mut mpsc::UnboundedReceiver<UpstreamHandle>) -> UpstreamHandle {
    tokio::time::timeout(RECV_TIMEOUT, handles.recv())
        .await
        .expect("timed out waiting for upstream connection")
        .expect("connector dropped")
}

// =============================================================================
// Server and client
// =============================================================================

pub fn test_state(
    config: ServerConfig,
    connector: Arc<dyn RealtimeConnector>,
    store: Arc<dyn OrderStore>,
) -> Arc<AppState> {
    AppState::with_components(config, connector, store)
}

/// Serve the full application on an ephemeral port.
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub async fn connect_media_stream(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/media-stream"))
        .await
        .expect("media stream upgrade failed");
    client
}

pub async fn send_event(client: &mut Client, event: Value) {
    client
        .send(Message::Text(event.to_string().into()))
        .await
        .unwrap();
}

pub fn start_event(stream_sid: &str, call_sid: &str) -> Value {
    json!({
        "event": "start",
        "start": {
            "streamSid": stream_sid,
            "callSid": call_sid,
            "customParameters": {"callIdentity": call_sid}
        }
    })
}

pub fn media_event(audio: &[u8]) -> Value {
    json!({
        "event": "media",
        "media": {"track": "inbound", "payload": BASE64_STANDARD.encode(audio)}
    })
}

pub fn audio_delta(item_id: &str, len: usize) -> Value {
    json!({
        "type": "response.audio.delta",
        "item_id": item_id,
        "delta": BASE64_STANDARD.encode(vec![0xFFu8; len]),
    })
}

/// What the carrier side of the socket observed.
#[derive(Debug, PartialEq)]
pub enum Received {
    Event(Value),
    Closed(Option<u16>),
}

/// Next text event or close frame, skipping control frames.
pub async fn next_received(client: &mut Client) -> Received {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for server message");
        match msg {
            Some(Ok(Message::Text(text))) => {
                return Received::Event(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(frame))) => {
                return Received::Closed(frame.map(|f| u16::from(f.code)));
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Received::Closed(None),
        }
    }
}

/// Decoded audio of a media event.
pub fn media_audio(event: &Value) -> Vec<u8> {
    assert_eq!(event["event"], "media", "expected media event, got {event}");
    BASE64_STANDARD
        .decode(event["media"]["payload"].as_str().unwrap())
        .unwrap()
}
