//! Error taxonomy for the call bridge.
//!
//! Every I/O boundary of a call session maps its failures into [`BridgeError`].
//! `Transport` and `UpstreamConnect` end the session; the remaining variants are
//! recovered where they occur (logged, skipped, or reported back to the model).

use thiserror::Error;

use crate::core::orders::PersistenceError;
use crate::core::realtime::RealtimeError;

/// Errors raised while bridging a call.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A socket closed or failed mid-session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message on either socket could not be decoded.
    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    /// Tool-call arguments were missing or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The order store rejected or failed a write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The realtime AI endpoint could not be reached in time.
    #[error("Upstream connect error: {0}")]
    UpstreamConnect(String),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::ProtocolParse(err.to_string())
    }
}

impl From<PersistenceError> for BridgeError {
    fn from(err: PersistenceError) -> Self {
        BridgeError::Persistence(err.to_string())
    }
}

impl From<RealtimeError> for BridgeError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::ConnectionFailed(msg)
            | RealtimeError::AuthenticationFailed(msg)
            | RealtimeError::InvalidConfiguration(msg) => BridgeError::UpstreamConnect(msg),
            RealtimeError::Timeout(msg) => BridgeError::UpstreamConnect(msg),
            RealtimeError::NotConnected => {
                BridgeError::Transport("realtime link not connected".to_string())
            }
        }
    }
}
