//! Assistant → caller relay.
//!
//! Consumes upstream events in arrival order: audio deltas are gated by the
//! barge-in controller and queued for the pacer, server-side speech detection
//! triggers an interruption, and function calls are accumulated and dispatched.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::barge_in::InterruptSource;
use super::session::{SharedSession, deliver_interruption};
use super::tools::{ToolCallTracker, ToolDispatcher};
use crate::core::realtime::{ClientEvent, ServerEvent};
use crate::errors::{BridgeError, BridgeResult};

pub struct DownlinkRelay {
    pub(crate) session: Arc<SharedSession>,
    pub(crate) upstream: mpsc::Sender<ClientEvent>,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) tracker: ToolCallTracker,
}

impl DownlinkRelay {
    /// Run until the upstream event stream ends, which is always an error.
    pub async fn run(mut self, mut events: mpsc::Receiver<ServerEvent>) -> BridgeResult<()> {
        while let Some(event) = events.recv().await {
            self.handle(event).await?;
        }
        Err(BridgeError::Transport(
            "realtime connection closed".to_string(),
        ))
    }

    async fn handle(&mut self, event: ServerEvent) -> BridgeResult<()> {
        match event {
            ServerEvent::AudioDelta { item_id, delta, .. } => {
                let audio = match ServerEvent::decode_audio_delta(&delta) {
                    Ok(audio) => audio,
                    Err(e) => {
                        let err = BridgeError::ProtocolParse(e.to_string());
                        warn!(item_id = %item_id, error = %err, "Skipping undecodable audio delta");
                        return Ok(());
                    }
                };

                let queued = self.session.lock().accept_audio(&item_id, &audio);
                if queued > 0 {
                    self.session.notify_frames();
                }
            }

            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                debug!(audio_start_ms, "Upstream detected caller speech");
                let interruption = self.session.lock().interrupt(InterruptSource::ServerVad);
                if let Some(interruption) = interruption {
                    deliver_interruption(interruption, &self.session, &self.upstream).await?;
                }
            }

            ServerEvent::OutputItemAdded { item, .. } => {
                self.session.lock().barge_in.on_output_item_added();
                if item.is_function_call()
                    && let Some(call_id) = item.call_id.as_deref()
                {
                    debug!(call_id, name = ?item.name, "Function call started");
                    self.tracker.on_item_added(call_id, item.name.as_deref());
                }
            }

            ServerEvent::FunctionCallArgumentsDelta { call_id, delta, .. } => {
                self.tracker.on_delta(&call_id, &delta);
            }

            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                let call = self.tracker.complete(&call_id, name.as_deref(), &arguments);
                let phone = {
                    let mut session = self.session.lock();
                    session.stats.tool_calls += 1;
                    session.caller_phone.clone()
                };
                self.dispatcher
                    .dispatch(call, &phone, &self.upstream)
                    .await?;
            }

            ServerEvent::ResponseDone { response } => {
                debug!(response_id = %response.id, status = %response.status, "Response done");
                self.session.lock().barge_in.on_response_done();
            }

            ServerEvent::ResponseCreated { response } => {
                trace!(response_id = %response.id, "Response created");
            }

            ServerEvent::SessionCreated { session } => {
                info!(session_id = %session.id, model = ?session.model, "Realtime session created");
            }

            ServerEvent::SessionUpdated { session } => {
                debug!(session_id = %session.id, voice = ?session.voice, "Realtime session updated");
            }

            ServerEvent::Error { error } => {
                warn!(
                    error_type = %error.error_type,
                    code = ?error.code,
                    message = %error.message,
                    "Realtime API error"
                );
            }

            ServerEvent::SpeechStopped { .. }
            | ServerEvent::InputAudioBufferCommitted { .. }
            | ServerEvent::AudioDone { .. }
            | ServerEvent::Unknown => {
                trace!("Ignoring upstream event");
            }
        }
        Ok(())
    }
}
