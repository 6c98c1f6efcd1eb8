//! Telephony media-stream WebSocket handler
//!
//! Each upgraded socket is one call. The socket is split into a sender task
//! fed by a [`TelephonyRoute`] channel and a read loop that decodes carrier
//! events into the call supervisor's inbound channel. The supervisor owns the
//! upstream AI connection and decides how the socket is closed.

use axum::{
    extract::{
        Extension, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::{select, sync::mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::bridge::TelephonyInbound;
use crate::core::telephony::{TelephonyEvent, TelephonyRoute};
use crate::errors::BridgeError;
use crate::middleware::ActiveCall;
use crate::state::AppState;

/// Channel buffer size for socket routing
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size. Carrier frames are small JSON documents.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long queued outbound frames may take to flush once the call ends
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET /media-stream`
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    call: Option<Extension<ActiveCall>>,
) -> Response {
    debug!("Media stream upgrade requested");

    let call = call.map(|Extension(call)| call);
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state, call))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>, call: Option<ActiveCall>) {
    let connection_id = Uuid::new_v4().to_string();
    info!(connection_id = %connection_id, "Media stream connected");

    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<TelephonyRoute>(CHANNEL_BUFFER_SIZE);
    let (inbound_tx, inbound_rx) = mpsc::channel::<TelephonyInbound>(CHANNEL_BUFFER_SIZE);

    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let should_close = matches!(route, TelephonyRoute::Close { .. });

            let result = match route {
                TelephonyRoute::Outgoing(event) => match serde_json::to_string(&event) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize telephony event: {}", e);
                        continue;
                    }
                },
                TelephonyRoute::Close { code, reason } => {
                    debug!(code, reason = %reason, "Closing media stream");
                    sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await
                }
            };

            if let Err(e) = result {
                debug!("Failed to send media stream message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let bridge = state
        .supervisor
        .run(connection_id.clone(), inbound_rx, route_tx);
    tokio::pin!(bridge);

    let mut inbound_tx = Some(inbound_tx);

    let outcome = loop {
        select! {
            outcome = &mut bridge => break outcome,
            msg = receiver.next(), if inbound_tx.is_some() => {
                let keep_reading = match msg {
                    Some(Ok(msg)) => match forward_message(msg, &connection_id) {
                        Some(inbound) => match &inbound_tx {
                            Some(tx) => tx.send(inbound).await.is_ok(),
                            None => false,
                        },
                        None => true,
                    },
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, "Media stream error: {}", e);
                        if let Some(tx) = &inbound_tx {
                            let _ = tx
                                .send(Err(BridgeError::Transport(format!("telephony socket error: {e}"))))
                                .await;
                        }
                        false
                    }
                    None => {
                        debug!(connection_id = %connection_id, "Media stream closed by carrier");
                        false
                    }
                };

                if !keep_reading {
                    // Closing the inbound channel tells the uplink the caller is gone.
                    inbound_tx = None;
                }
            }
        }
    };

    match outcome {
        Ok(summary) => debug!(
            connection_id = %connection_id,
            frames_played = summary.stats.frames_played,
            "Media stream bridge finished"
        ),
        Err(e) => warn!(connection_id = %connection_id, error = %e, "Media stream bridge failed"),
    }

    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        warn!(connection_id = %connection_id, "Telephony sender did not drain, aborting");
        sender_task.abort();
    }

    drop(call);
    info!(connection_id = %connection_id, "Media stream terminated");
}

/// Decode one socket message. `None` means there is nothing to forward.
fn forward_message(msg: Message, connection_id: &str) -> Option<TelephonyInbound> {
    match msg {
        Message::Text(text) => match TelephonyEvent::parse(text.as_str()) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(connection_id, "Skipping malformed telephony event: {}", e);
                None
            }
        },
        Message::Binary(data) => {
            debug!(connection_id, len = data.len(), "Ignoring binary frame");
            None
        }
        Message::Close(frame) => {
            debug!(connection_id, ?frame, "Carrier sent close");
            Some(Ok(TelephonyEvent::Stop { stream_sid: None }))
        }
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
