pub mod calls;

use axum::{Router, middleware, routing::get};
use http::HeaderValue;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::handlers::api::health_check;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Complete application router.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`; the call
/// limit middleware reads the peer address.
pub fn create_app(state: Arc<AppState>) -> Router {
    let media_routes = calls::create_media_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    Router::new()
        .route("/", get(health_check))
        .merge(calls::create_webhook_router())
        .merge(media_routes)
        .with_state(state)
        .layer(security_headers)
}
