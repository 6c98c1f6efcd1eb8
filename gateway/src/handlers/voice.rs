//! Call-setup webhook.
//!
//! The carrier posts here when a call arrives. The caller's number is recorded
//! against the call identity and the response instructs the carrier to open a
//! media stream back to this server, passing the identity as a stream
//! parameter so the session can look the caller up.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::{Position, Url};

use crate::core::registry::UNKNOWN_PHONE;
use crate::core::telephony::CALL_IDENTITY_PARAMETER;
use crate::state::AppState;

/// Path of the media-stream WebSocket route.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Form fields posted by the carrier. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
}

/// `POST /voice`
pub async fn voice_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(call): Form<VoiceWebhook>,
) -> Response {
    let stream_url = match stream_url(&state, &headers) {
        Ok(url) => url,
        Err(e) => {
            warn!(call_sid = %call.call_sid, error = %e, "Cannot build media stream URL");
            return (StatusCode::INTERNAL_SERVER_ERROR, e).into_response();
        }
    };

    let from = call
        .from
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_PHONE.to_string());
    info!(call_sid = %call.call_sid, stream_url = %stream_url, "Incoming call");
    state.registry.register(call.call_sid.clone(), from);

    (
        [(header::CONTENT_TYPE, "text/xml")],
        connect_stream_twiml(&stream_url, &call.call_sid),
    )
        .into_response()
}

fn stream_url(state: &AppState, headers: &HeaderMap) -> Result<String, String> {
    if let Some(public_url) = &state.config.public_url {
        return websocket_url(public_url)
            .map_err(|e| format!("Invalid public URL ({public_url}): {e}"));
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| "No public URL configured and no Host header".to_string())?;
    let scheme = if state.config.is_tls_enabled() {
        "wss"
    } else {
        "ws"
    };
    Ok(format!("{scheme}://{host}{MEDIA_STREAM_PATH}"))
}

/// Media stream URL under a public base URL. `http` maps to `ws`, everything
/// else to `wss`.
pub fn websocket_url(public_url: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(public_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        _ => "wss",
    };
    let base = url[Position::BeforeHost..Position::AfterPath].trim_end_matches('/');
    Ok(format!("{scheme}://{base}{MEDIA_STREAM_PATH}"))
}

/// TwiML connecting the call to a media stream.
pub fn connect_stream_twiml(stream_url: &str, call_sid: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<Response><Connect><Stream url="{url}">"#,
            r#"<Parameter name="{name}" value="{value}"/>"#,
            r#"</Stream></Connect></Response>"#
        ),
        url = escape_xml(stream_url),
        name = CALL_IDENTITY_PARAMETER,
        value = escape_xml(call_sid),
    )
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
