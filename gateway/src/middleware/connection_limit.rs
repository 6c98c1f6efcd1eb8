//! Concurrent call limit for media stream upgrades.
//!
//! Only WebSocket upgrade requests are counted. When the configured ceiling is
//! reached the upgrade is refused with 503 and the carrier ends the call.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::{AppState, CallPermit, ConnectionLimitError};

/// Slot reserved for an upgraded media stream.
///
/// The handler moves this into the socket task; the slot is released when the
/// last clone is dropped.
#[derive(Clone, Debug)]
pub struct ActiveCall(pub Arc<CallPermit>);

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Reserve a call slot for WebSocket upgrades, or answer 503 when full.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    match state.try_acquire_call() {
        Ok(permit) => {
            request
                .extensions_mut()
                .insert(ActiveCall(Arc::new(permit)));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                ip = %addr.ip(),
                active = state.active_calls(),
                "Rejecting media stream: call limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
    }
}
