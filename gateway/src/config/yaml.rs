use serde::Deserialize;
use std::path::PathBuf;

use crate::core::bridge::UplinkPolicy;
use crate::core::vad::VadProfile;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///   public_url: "https://bridge.example.com"
///   tls:
///     enabled: true
///     cert_path: "/etc/callbridge/cert.pem"
///     key_path: "/etc/callbridge/key.pem"
///
/// realtime:
///   api_key: "sk-..."
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   connect_timeout_ms: 10000
///
/// bridge:
///   uplink_policy: "always_forward"
///   playback_queue_frames: 500
///   registry_ttl_seconds: 3600
///   max_concurrent_calls: 100
///
/// vad:
///   strict:
///     peak_threshold: 7000
///
/// orders:
///   url: "http://orders.internal:8080"
///   timeout_ms: 5000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub bridge: Option<BridgeYaml>,
    pub vad: Option<VadYaml>,
    pub orders: Option<OrdersYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Externally reachable base URL used in TwiML stream URLs
    pub public_url: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Realtime AI endpoint settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Call bridge settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeYaml {
    pub uplink_policy: Option<UplinkPolicy>,
    pub playback_queue_frames: Option<usize>,
    pub registry_ttl_seconds: Option<u64>,
    pub max_concurrent_calls: Option<usize>,
}

/// VAD threshold overrides from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub normal: Option<VadProfileYaml>,
    pub strict: Option<VadProfileYaml>,
}

/// Per-profile VAD overrides; unset fields keep the profile default
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadProfileYaml {
    pub min_chunk_bytes: Option<usize>,
    pub loud_amplitude: Option<i32>,
    pub peak_threshold: Option<i32>,
    pub loud_ratio_threshold: Option<f32>,
    pub mean_threshold: Option<f32>,
    pub secondary_ratio_threshold: Option<f32>,
}

impl VadProfileYaml {
    /// Overlay these values on `profile`.
    pub fn apply_to(&self, profile: &mut VadProfile) {
        if let Some(v) = self.min_chunk_bytes {
            profile.min_chunk_bytes = v;
        }
        if let Some(v) = self.loud_amplitude {
            profile.loud_amplitude = v;
        }
        if let Some(v) = self.peak_threshold {
            profile.peak_threshold = v;
        }
        if let Some(v) = self.loud_ratio_threshold {
            profile.loud_ratio_threshold = v;
        }
        if let Some(v) = self.mean_threshold {
            profile.mean_threshold = v;
        }
        if let Some(v) = self.secondary_ratio_threshold {
            profile.secondary_ratio_threshold = v;
        }
    }
}

/// Order store settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OrdersYaml {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid YAML
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
