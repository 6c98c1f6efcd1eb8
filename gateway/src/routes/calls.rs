//! Call routes
//!
//! `POST /voice` answers the carrier's call-setup webhook with TwiML pointing
//! at `GET /media-stream`, the WebSocket that carries the call audio.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream::media_stream_handler;
use crate::handlers::voice::{MEDIA_STREAM_PATH, voice_webhook};
use crate::state::AppState;

/// Call-setup webhook router
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice", post(voice_webhook))
        .layer(TraceLayer::new_for_http())
}

/// Media stream WebSocket router. Apply the call limit middleware on top.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
