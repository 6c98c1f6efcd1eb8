//! OpenAI Realtime API module.
//!
//! Connector, wire messages and session settings for bridging phone calls to
//! OpenAI's Realtime API.
//!
//! # Audio Format
//!
//! Calls run with G.711 μ-law at 8kHz in both directions, the same encoding
//! the telephony media stream carries, so audio passes through untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use callbridge_gateway::core::realtime::{OpenAIRealtime, RealtimeConfig, RealtimeConnector};
//!
//! let connector = OpenAIRealtime::new(RealtimeConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! })?;
//! let mut link = connector.connect().await?;
//! while let Some(event) = link.events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    CREATE_ORDER_TOOL, DEFAULT_INSTRUCTIONS, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeModel, OpenAIRealtimeVoice, call_session_config, create_order_tool,
};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, ResponseConfig, ServerEvent, Session, SessionConfig,
    ToolDef, TurnDetection,
};
pub use messages::Response as RealtimeResponse;
