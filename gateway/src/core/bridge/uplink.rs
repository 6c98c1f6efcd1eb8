//! Caller → assistant relay.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::barge_in::InterruptSource;
use super::session::{SharedSession, deliver_interruption};
use crate::core::realtime::ClientEvent;
use crate::core::registry::CallRegistry;
use crate::core::telephony::{MediaPayload, StreamStart, TelephonyEvent};
use crate::core::vad::{VadMode, VadProfiles, detect_speech};
use crate::errors::{BridgeError, BridgeResult};

/// One item read from the telephony socket. Socket failures arrive as
/// `Err(BridgeError::Transport)`.
pub type TelephonyInbound = BridgeResult<TelephonyEvent>;

/// When caller audio is forwarded upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UplinkPolicy {
    /// Forward every media chunk
    #[default]
    AlwaysForward,
    /// Hold caller audio back while the assistant is responding
    ForwardWhileAiSilent,
}

impl UplinkPolicy {
    pub fn should_forward(&self, ai_responding: bool) -> bool {
        match self {
            UplinkPolicy::AlwaysForward => true,
            UplinkPolicy::ForwardWhileAiSilent => !ai_responding,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always_forward" | "always" => Some(UplinkPolicy::AlwaysForward),
            "forward_while_ai_silent" | "silent_only" => Some(UplinkPolicy::ForwardWhileAiSilent),
            _ => None,
        }
    }
}

impl std::fmt::Display for UplinkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UplinkPolicy::AlwaysForward => write!(f, "always_forward"),
            UplinkPolicy::ForwardWhileAiSilent => write!(f, "forward_while_ai_silent"),
        }
    }
}

/// Reads telephony events, runs barge-in detection on caller audio and
/// forwards it to the assistant.
pub struct UplinkRelay {
    pub(crate) session: Arc<SharedSession>,
    pub(crate) registry: Arc<CallRegistry>,
    pub(crate) vad: VadProfiles,
    pub(crate) policy: UplinkPolicy,
    pub(crate) upstream: mpsc::Sender<ClientEvent>,
}

impl UplinkRelay {
    /// Run until the carrier sends `stop`, the socket ends, or the upstream goes away.
    pub async fn run(self, mut inbound: mpsc::Receiver<TelephonyInbound>) -> BridgeResult<()> {
        while let Some(item) = inbound.recv().await {
            match item? {
                TelephonyEvent::Connected { protocol } => {
                    debug!(?protocol, "Telephony stream connected");
                }
                TelephonyEvent::Start { start } => self.on_start(&start),
                TelephonyEvent::Media { media } => self.on_media(media).await?,
                TelephonyEvent::Mark { mark } => {
                    debug!(mark = ?mark.map(|m| m.name), "Mark received, requesting response");
                    self.send_upstream(ClientEvent::InputAudioBufferCommit).await?;
                    self.send_upstream(ClientEvent::response_create()).await?;
                }
                TelephonyEvent::Stop { stream_sid } => {
                    info!(?stream_sid, "Telephony stream stopped");
                    return Ok(());
                }
                TelephonyEvent::Dtmf { dtmf } => {
                    debug!(digit = ?dtmf.map(|d| d.digit), "Ignoring DTMF");
                }
                TelephonyEvent::Unknown => trace!("Ignoring unknown telephony event"),
            }
        }

        debug!("Telephony stream closed without stop");
        Ok(())
    }

    fn on_start(&self, start: &StreamStart) {
        let identity = start.call_identity().map(str::to_string);
        let phone = self.registry.resolve(identity.as_deref());
        {
            let mut session = self.session.lock();
            session.stream_sid = Some(start.stream_sid.clone());
            session.call_identity = identity.clone();
            session.caller_phone = phone;
            info!(
                connection_id = %session.connection_id,
                stream_sid = %start.stream_sid,
                call_identity = ?identity,
                caller_phone = %session.caller_phone,
                "Telephony stream started"
            );
        }
        // Frames queued before the stream id was known can now go out.
        self.session.notify_frames();
    }

    async fn on_media(&self, media: MediaPayload) -> BridgeResult<()> {
        let audio = match media.decode() {
            Ok(audio) => audio,
            Err(e) => {
                let err = BridgeError::ProtocolParse(e.to_string());
                warn!(error = %err, "Skipping undecodable media payload");
                return Ok(());
            }
        };

        let (interruption, forward) = {
            let mut session = self.session.lock();
            let interruption = if session.barge_in.is_responding() {
                if detect_speech(&audio, self.vad.get(VadMode::Strict)) {
                    session.interrupt(InterruptSource::LocalVad)
                } else {
                    None
                }
            } else if session.has_pending_playback()
                && detect_speech(&audio, self.vad.get(VadMode::Normal))
            {
                session.interrupt_drain()
            } else {
                None
            };
            let forward = self.policy.should_forward(session.barge_in.is_responding());
            (interruption, forward)
        };

        if let Some(interruption) = interruption {
            deliver_interruption(interruption, &self.session, &self.upstream).await?;
        }

        if forward {
            self.send_upstream(ClientEvent::InputAudioBufferAppend {
                audio: media.payload,
            })
            .await?;
        }
        Ok(())
    }

    async fn send_upstream(&self, event: ClientEvent) -> BridgeResult<()> {
        self.upstream
            .send(event)
            .await
            .map_err(|_| BridgeError::Transport("realtime connection closed".to_string()))
    }
}
