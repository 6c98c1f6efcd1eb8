//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `voice` - Call-setup webhook returning TwiML
//! - `media_stream` - Telephony media-stream WebSocket bridged to the AI endpoint

pub mod api;
pub mod media_stream;
pub mod voice;

pub use api::health_check;
pub use media_stream::media_stream_handler;
pub use voice::voice_webhook;
