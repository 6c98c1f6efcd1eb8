//! OpenAI Realtime API configuration types.
//!
//! Model and voice names accepted by the endpoint, the audio formats it can
//! exchange, and the session settings used for phone calls.

use serde::{Deserialize, Serialize};

use super::messages::{SessionConfig, ToolDef, TurnDetection};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default instructions for the order-taking assistant.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a friendly phone assistant for a pizza shop. \
Take the caller's order: ask for the pizza flavour, the size (small, medium or large), \
an optional drink, the delivery address and the caller's name. Confirm the order back \
to the caller, then call create_order. Keep answers short; the caller is on the phone.";

// =============================================================================
// Models
// =============================================================================

/// Supported OpenAI Realtime models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenAIRealtimeModel {
    #[default]
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    #[serde(rename = "gpt-4o-realtime-preview-2024-12-17")]
    Gpt4oRealtimePreview20241217,
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
}

impl OpenAIRealtimeModel {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            Self::Gpt4oRealtimePreview20241217 => "gpt-4o-realtime-preview-2024-12-17",
            Self::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
        }
    }

    /// Parse a known model name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gpt-4o-realtime-preview" => Some(Self::Gpt4oRealtimePreview),
            "gpt-4o-realtime-preview-2024-12-17" => Some(Self::Gpt4oRealtimePreview20241217),
            "gpt-4o-mini-realtime-preview" => Some(Self::Gpt4oMiniRealtimePreview),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Available voices for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    const ALL: [OpenAIRealtimeVoice; 8] = [
        Self::Alloy,
        Self::Ash,
        Self::Ballad,
        Self::Coral,
        Self::Echo,
        Self::Sage,
        Self::Shimmer,
        Self::Verse,
    ];

    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse a known voice name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Audio Formats
// =============================================================================

/// Audio formats the realtime endpoint can exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeAudioFormat {
    Pcm16,
    /// G.711 μ-law at 8 kHz, what the telephony leg carries
    #[default]
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl OpenAIRealtimeAudioFormat {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }

    /// Sample rate for this format.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Pcm16 => 24000,
            Self::G711Ulaw | Self::G711Alaw => 8000,
        }
    }
}

// =============================================================================
// Call Session Settings
// =============================================================================

/// Name of the order persistence tool exposed to the model.
pub const CREATE_ORDER_TOOL: &str = "create_order";

/// JSON schema of the `create_order` tool.
pub fn create_order_tool() -> ToolDef {
    ToolDef {
        tool_type: "function".to_string(),
        name: CREATE_ORDER_TOOL.to_string(),
        description: Some(
            "Store a confirmed pizza order once every required detail is known.".to_string(),
        ),
        parameters: Some(serde_json::json!({
            "type": "object",
            "properties": {
                "flavour": { "type": "string", "description": "Pizza flavour" },
                "size": { "type": "string", "enum": ["small", "medium", "large"] },
                "drink": { "type": "string", "description": "Optional drink" },
                "address": { "type": "string", "description": "Delivery address" },
                "customer_name": { "type": "string", "description": "Caller's name" }
            },
            "required": ["flavour", "size", "address", "customer_name"]
        })),
    }
}

/// Build the `session.update` payload for a phone call.
///
/// Audio is μ-law both ways so no transcoding happens on the bridge, and the
/// server's own VAD handles turn ends.
pub fn call_session_config(voice: &str, instructions: Option<&str>) -> SessionConfig {
    let format = OpenAIRealtimeAudioFormat::G711Ulaw.as_str().to_string();
    SessionConfig {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(instructions.unwrap_or(DEFAULT_INSTRUCTIONS).to_string()),
        voice: Some(voice.to_string()),
        input_audio_format: Some(format.clone()),
        output_audio_format: Some(format),
        turn_detection: Some(TurnDetection::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }),
        tools: Some(vec![create_order_tool()]),
        tool_choice: Some("auto".to_string()),
        temperature: None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parse() {
        assert_eq!(
            OpenAIRealtimeModel::parse("GPT-4o-realtime-preview"),
            Some(OpenAIRealtimeModel::Gpt4oRealtimePreview)
        );
        assert_eq!(OpenAIRealtimeModel::parse("gpt-3"), None);
        assert_eq!(
            OpenAIRealtimeModel::Gpt4oMiniRealtimePreview.to_string(),
            "gpt-4o-mini-realtime-preview"
        );
    }

    #[test]
    fn test_voice_parse() {
        assert_eq!(
            OpenAIRealtimeVoice::parse("SHIMMER"),
            Some(OpenAIRealtimeVoice::Shimmer)
        );
        assert_eq!(OpenAIRealtimeVoice::parse("nova"), None);
    }

    #[test]
    fn test_telephony_format_is_default() {
        let format = OpenAIRealtimeAudioFormat::default();
        assert_eq!(format.as_str(), "g711_ulaw");
        assert_eq!(format.sample_rate(), 8000);
        assert_eq!(OpenAIRealtimeAudioFormat::Pcm16.sample_rate(), 24000);
    }

    #[test]
    fn test_call_session_config() {
        let session = call_session_config("verse", None);
        let json = serde_json::to_value(&session).unwrap();

        assert_eq!(json["input_audio_format"], "g711_ulaw");
        assert_eq!(json["output_audio_format"], "g711_ulaw");
        assert_eq!(json["voice"], "verse");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["tools"][0]["name"], "create_order");
        assert_eq!(json["instructions"], DEFAULT_INSTRUCTIONS);
    }

    #[test]
    fn test_create_order_schema_required_fields() {
        let tool = create_order_tool();
        let params = tool.parameters.unwrap();
        let required: Vec<&str> = params["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, ["flavour", "size", "address", "customer_name"]);
        assert!(params["properties"].get("drink").is_some());
    }
}
