//! OpenAI Realtime API client implementation.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 μ-law, 8kHz, base64 encoded
//!
//! Connecting spawns a single task that owns the socket. It forwards
//! [`ClientEvent`]s from the link's command channel and decodes incoming text
//! frames into [`ServerEvent`]s. Undecodable frames are logged and skipped.
//! The task ends, closing the event channel, when the socket closes or errors,
//! or when every command sender has been dropped.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::{HeaderValue, StatusCode};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, warn};

use super::messages::{ClientEvent, ServerEvent};
use crate::core::realtime::base::{
    RealtimeConfig, RealtimeConnector, RealtimeError, RealtimeLink, RealtimeResult,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for decoded server events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// Connector for the OpenAI Realtime API.
///
/// Holds only configuration; every [`connect`](RealtimeConnector::connect)
/// opens an independent socket for one call.
#[derive(Debug, Clone)]
pub struct OpenAIRealtime {
    config: RealtimeConfig,
}

impl OpenAIRealtime {
    /// Create a connector. Fails when no API key is configured.
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "OpenAI API key is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// The WebSocket URL including the model query parameter.
    pub fn build_ws_url(&self) -> String {
        let separator = if self.config.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.config.url, separator, self.config.model)
    }

    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let mut request = self
            .build_ws_url()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(http::header::AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }

    async fn open(&self) -> RealtimeResult<RealtimeLink> {
        let request = self.build_request()?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(handshake_error)?;

        info!(model = %self.config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (command_tx, mut command_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = command_rx.recv() => {
                        let Some(event) = command else {
                            debug!("Realtime command channel closed, closing socket");
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        };

                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                error!("Failed to serialize {}: {}", event.kind(), e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if event_tx.send(event).await.is_err() {
                                            debug!("Realtime event receiver dropped");
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!("Failed to parse server event: {} - {}", e, text);
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!(?frame, "Realtime WebSocket closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("Realtime WebSocket error: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(RealtimeLink::new(command_tx, event_rx))
    }
}

/// Classify a failed upgrade. A rejected key is reported separately.
fn handshake_error(err: WsError) -> RealtimeError {
    match err {
        WsError::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            RealtimeError::AuthenticationFailed(format!(
                "handshake rejected with {}",
                response.status()
            ))
        }
        other => RealtimeError::ConnectionFailed(other.to_string()),
    }
}

#[async_trait]
impl RealtimeConnector for OpenAIRealtime {
    async fn connect(&self) -> RealtimeResult<RealtimeLink> {
        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::Timeout(format!(
                "no handshake from {} within {}ms",
                self.config.url, self.config.connect_timeout_ms
            ))),
        }
    }
}
