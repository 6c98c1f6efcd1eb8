//! Telephony media-stream wire protocol.
//!
//! The carrier opens a WebSocket and exchanges JSON text frames tagged by an
//! `event` field. Audio is base64 μ-law at 8kHz.
//!
//! Inbound: `connected`, `start`, `media`, `mark`, `stop`, `dtmf`.
//! Outbound: `media` and `clear`, both addressed by `streamSid`.

use std::collections::HashMap;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::BridgeResult;

/// WebSocket close code used when the upstream AI endpoint is unavailable.
pub const CLOSE_UPSTREAM_UNAVAILABLE: u16 = 1011;

/// Close reason paired with [`CLOSE_UPSTREAM_UNAVAILABLE`].
pub const CLOSE_UPSTREAM_REASON: &str = "upstream realtime connection failed";

/// WebSocket close code for a call that ended normally.
pub const CLOSE_NORMAL: u16 = 1000;

/// Custom stream parameter carrying the call identity, set by the voice webhook.
pub const CALL_IDENTITY_PARAMETER: &str = "callIdentity";

// =============================================================================
// Inbound
// =============================================================================

/// Events received from the carrier.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },

    /// Stream metadata, always before the first media event
    Start { start: StreamStart },

    Media { media: MediaPayload },

    /// Playback/turn marker echoed by the carrier
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },

    Stop {
        #[serde(default, rename = "streamSid")]
        stream_sid: Option<String>,
    },

    Dtmf {
        #[serde(default)]
        dtmf: Option<DtmfPayload>,
    },

    #[serde(other)]
    Unknown,
}

/// Payload of the `start` event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_identity: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StreamStart {
    /// Identity used to look the caller up in the call registry.
    ///
    /// Prefers `callIdentity` on the start payload, then the custom
    /// parameter, then the carrier's call sid. Blank values are skipped.
    pub fn call_identity(&self) -> Option<&str> {
        [
            self.call_identity.as_deref(),
            self.custom_parameters.get(CALL_IDENTITY_PARAMETER).map(String::as_str),
            self.call_sid.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|id| !id.trim().is_empty())
    }
}

/// Payload of the `media` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    /// Base64 μ-law audio
    pub payload: String,
}

impl MediaPayload {
    /// Decode the base64 audio.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.payload)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPayload {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DtmfPayload {
    #[serde(default)]
    pub digit: String,
}

impl TelephonyEvent {
    /// Decode one text frame.
    pub fn parse(text: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Events sent to the carrier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    /// One frame of audio to play to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Discard audio the carrier has buffered but not yet played
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    /// Base64 μ-law audio
    pub payload: String,
}

impl TelephonyOutbound {
    /// Build a media event from raw μ-law bytes.
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: BASE64_STANDARD.encode(audio),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyOutbound::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}

/// Routing for the telephony socket's sender task.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyRoute {
    /// JSON event to send
    Outgoing(TelephonyOutbound),
    /// Close the socket with a code and reason
    Close { code: u16, reason: String },
}

impl TelephonyRoute {
    /// Close frame sent when the AI endpoint cannot be reached.
    pub fn upstream_unavailable() -> Self {
        TelephonyRoute::Close {
            code: CLOSE_UPSTREAM_UNAVAILABLE,
            reason: CLOSE_UPSTREAM_REASON.to_string(),
        }
    }

    pub fn call_ended() -> Self {
        TelephonyRoute::Close {
            code: CLOSE_NORMAL,
            reason: "call ended".to_string(),
        }
    }
}
