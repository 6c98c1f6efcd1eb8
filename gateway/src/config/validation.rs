use url::Url;

use crate::core::realtime::openai::{OpenAIRealtimeModel, OpenAIRealtimeVoice};
use crate::core::vad::VadProfiles;

use super::ServerConfig;

/// Validate the realtime model and voice names.
pub(super) fn validate_realtime(model: &str, voice: &str) -> Result<(), Box<dyn std::error::Error>> {
    if OpenAIRealtimeModel::parse(model).is_none() {
        return Err(format!("Unsupported realtime model: {model}").into());
    }
    if OpenAIRealtimeVoice::parse(voice).is_none() {
        return Err(format!("Unsupported realtime voice: {voice}").into());
    }
    Ok(())
}

/// Validate a URL and restrict it to the given schemes.
pub(super) fn validate_url(
    name: &str,
    value: &str,
    schemes: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Url::parse(value).map_err(|e| format!("Invalid {name} ({value}): {e}"))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(format!(
            "Invalid {name} ({value}): scheme must be one of {}",
            schemes.join(", ")
        )
        .into());
    }
    Ok(())
}

/// Validate both VAD profiles.
pub(super) fn validate_vad(profiles: &VadProfiles) -> Result<(), Box<dyn std::error::Error>> {
    profiles
        .validate()
        .map_err(|e| format!("Invalid VAD configuration: {e}").into())
}

/// Validate call bridge limits.
pub(super) fn validate_bridge(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.playback_queue_frames == 0 {
        return Err("playback_queue_frames must be greater than 0".into());
    }
    if config.registry_ttl_seconds == 0 {
        return Err("registry_ttl_seconds must be greater than 0".into());
    }
    if config.max_concurrent_calls == Some(0) {
        return Err("max_concurrent_calls must be greater than 0 when set".into());
    }
    if config.realtime_connect_timeout_ms == 0 {
        return Err("realtime connect_timeout_ms must be greater than 0".into());
    }
    if config.order_store_timeout_ms == 0 {
        return Err("orders timeout_ms must be greater than 0".into());
    }
    Ok(())
}

/// Run every check against a loaded configuration.
pub(super) fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_realtime(&config.realtime_model, &config.realtime_voice)?;
    validate_url("REALTIME_URL", &config.realtime_url, &["ws", "wss"])?;
    if let Some(public_url) = &config.public_url {
        validate_url("PUBLIC_URL", public_url, &["http", "https", "ws", "wss"])?;
    }
    if let Some(orders_url) = &config.order_store_url {
        validate_url("ORDER_STORE_URL", orders_url, &["http", "https"])?;
    }
    validate_vad(&config.vad)?;
    validate_bridge(config)?;
    Ok(())
}
