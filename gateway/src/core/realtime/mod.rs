//! Realtime AI endpoint module.
//!
//! # Architecture
//!
//! - [`RealtimeConnector`] opens one upstream connection per call
//! - [`RealtimeLink`] exposes that connection as a command sender and an
//!   event receiver
//! - [`OpenAIRealtime`] is the production connector; tests substitute their own
//!
//! Connections are never retried. A call whose upstream fails is closed.

mod base;
pub mod openai;

pub use base::{
    DEFAULT_CONNECT_TIMEOUT_MS, RealtimeConfig, RealtimeConnector, RealtimeError, RealtimeLink,
    RealtimeResult,
};
pub use openai::{ClientEvent, ConversationItem, OpenAIRealtime, ServerEvent};
