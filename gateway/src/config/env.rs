use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::bridge::UplinkPolicy;
use crate::core::bridge::pacer::DEFAULT_PLAYBACK_QUEUE_FRAMES;
use crate::core::orders::DEFAULT_ORDER_STORE_TIMEOUT_MS;
use crate::core::realtime::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::core::realtime::openai::{OPENAI_REALTIME_URL, OpenAIRealtimeModel, OpenAIRealtimeVoice};
use crate::core::vad::VadProfiles;

use super::{ServerConfig, TlsConfig};

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 8000;
pub(super) const DEFAULT_REGISTRY_TTL_SECONDS: u64 = 3600;

/// Read a variable, treating empty values as unset.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} ({raw}): {e}").into()),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables and defaults.
///
/// `.env` is loaded by the binary before this runs, so its values are
/// visible here as ordinary environment variables.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };

    let uplink_policy = match var("UPLINK_POLICY") {
        Some(raw) => UplinkPolicy::parse(&raw).ok_or_else(|| {
            format!(
                "Invalid value for UPLINK_POLICY ({raw}): expected always_forward or forward_while_ai_silent"
            )
        })?,
        None => UplinkPolicy::default(),
    };

    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
        tls,
        public_url: var("PUBLIC_URL"),
        openai_api_key: var("OPENAI_API_KEY"),
        realtime_url: var("REALTIME_URL").unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        realtime_model: var("REALTIME_MODEL")
            .unwrap_or_else(|| OpenAIRealtimeModel::default().as_str().to_string()),
        realtime_voice: var("REALTIME_VOICE")
            .unwrap_or_else(|| OpenAIRealtimeVoice::default().as_str().to_string()),
        assistant_instructions: var("ASSISTANT_INSTRUCTIONS"),
        realtime_connect_timeout_ms: parse_var("REALTIME_CONNECT_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        uplink_policy,
        playback_queue_frames: parse_var("PLAYBACK_QUEUE_FRAMES")?
            .unwrap_or(DEFAULT_PLAYBACK_QUEUE_FRAMES),
        registry_ttl_seconds: parse_var("CALL_REGISTRY_TTL_SECONDS")?
            .unwrap_or(DEFAULT_REGISTRY_TTL_SECONDS),
        max_concurrent_calls: parse_var("MAX_CONCURRENT_CALLS")?,
        vad: VadProfiles::default(),
        order_store_url: var("ORDER_STORE_URL"),
        order_store_timeout_ms: parse_var("ORDER_STORE_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_ORDER_STORE_TIMEOUT_MS),
    })
}
