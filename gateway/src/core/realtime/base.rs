//! Base traits and types for the realtime AI endpoint.
//!
//! A call session never talks to the socket directly. It receives a
//! [`RealtimeLink`] from a [`RealtimeConnector`]: a command sender and an event
//! receiver, both backed by a task that owns the WebSocket. Dropping the
//! command sender closes the upstream connection.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::openai::{ClientEvent, ServerEvent};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Default bound on establishing the upstream connection.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Connection settings for the realtime endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint, without the model query parameter
    pub url: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview")
    pub model: String,

    /// Voice for audio output
    pub voice: String,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Upper bound on the WebSocket handshake
    pub connect_timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: super::openai::OPENAI_REALTIME_URL.to_string(),
            model: super::openai::OpenAIRealtimeModel::default()
                .as_str()
                .to_string(),
            voice: super::openai::OpenAIRealtimeVoice::default()
                .as_str()
                .to_string(),
            instructions: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl RealtimeConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An established realtime connection, seen as a pair of channels.
#[derive(Debug)]
pub struct RealtimeLink {
    /// Commands to send upstream, in order
    pub commands: mpsc::Sender<ClientEvent>,
    /// Decoded events from upstream, in arrival order.
    /// Closed when the upstream socket ends.
    pub events: mpsc::Receiver<ServerEvent>,
}

impl RealtimeLink {
    /// Build a link from raw channel ends. Used by connectors and test doubles.
    pub fn new(commands: mpsc::Sender<ClientEvent>, events: mpsc::Receiver<ServerEvent>) -> Self {
        Self { commands, events }
    }
}

/// Opens realtime connections for call sessions.
///
/// Implementations must not retry: a failed connect is reported once and the
/// session is closed.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Establish a new upstream connection.
    async fn connect(&self) -> RealtimeResult<RealtimeLink>;
}
