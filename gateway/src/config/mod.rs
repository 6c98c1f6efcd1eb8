//! Configuration module for the CallBridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::bridge::{BridgeSettings, FRAME_INTERVAL, UplinkPolicy};
use crate::core::realtime::RealtimeConfig;
use crate::core::vad::VadProfiles;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the bridge:
/// - Server settings (host, port, TLS, public URL)
/// - Realtime AI endpoint settings and API key
/// - Call bridge tunables (uplink policy, playback queue, registry TTL, call limit)
/// - VAD profiles
/// - Order store location
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Externally reachable base URL, e.g. `https://bridge.example.com`.
    /// When unset the webhook derives it from the request's Host header.
    pub public_url: Option<String>,

    // Realtime AI endpoint
    /// OpenAI API key for the Realtime API
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    /// System prompt; the built-in order-taking prompt when unset
    pub assistant_instructions: Option<String>,
    pub realtime_connect_timeout_ms: u64,

    // Call bridge
    pub uplink_policy: UplinkPolicy,
    /// Bound on queued 20ms playback frames per call
    pub playback_queue_frames: usize,
    /// Age after which unclaimed call registrations are evicted
    pub registry_ttl_seconds: u64,
    /// Maximum concurrent media streams
    /// Default: None (unlimited)
    pub max_concurrent_calls: Option<usize>,

    pub vad: VadProfiles,

    // Order store
    /// Base URL of the order service; orders are kept in memory when unset
    pub order_store_url: Option<String>,
    pub order_store_timeout_ms: u64,
}

/// Implement Drop to zeroize secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Note: .env file is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Connection settings for the realtime endpoint.
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
            voice: self.realtime_voice.clone(),
            instructions: self.assistant_instructions.clone(),
            connect_timeout_ms: self.realtime_connect_timeout_ms,
        }
    }

    /// Per-call settings for the bridge.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            voice: self.realtime_voice.clone(),
            instructions: self.assistant_instructions.clone(),
            connect_timeout: Duration::from_millis(self.realtime_connect_timeout_ms),
            uplink_policy: self.uplink_policy,
            playback_queue_frames: self.playback_queue_frames,
            frame_interval: FRAME_INTERVAL,
            vad: self.vad,
        }
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_seconds)
    }

    pub fn order_store_timeout(&self) -> Duration {
        Duration::from_millis(self.order_store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "HOST",
        "PORT",
        "PUBLIC_URL",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "OPENAI_API_KEY",
        "REALTIME_URL",
        "REALTIME_MODEL",
        "REALTIME_VOICE",
        "ASSISTANT_INSTRUCTIONS",
        "REALTIME_CONNECT_TIMEOUT_MS",
        "UPLINK_POLICY",
        "PLAYBACK_QUEUE_FRAMES",
        "CALL_REGISTRY_TTL_SECONDS",
        "MAX_CONCURRENT_CALLS",
        "ORDER_STORE_URL",
        "ORDER_STORE_TIMEOUT_MS",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in ENV_VARS {
                env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert!(!config.is_tls_enabled());
        assert!(config.public_url.is_none());
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.realtime_url, "wss://api.openai.com/v1/realtime");
        assert_eq!(config.realtime_model, "gpt-4o-realtime-preview");
        assert_eq!(config.realtime_voice, "alloy");
        assert_eq!(config.realtime_connect_timeout_ms, 10_000);
        assert_eq!(config.uplink_policy, UplinkPolicy::AlwaysForward);
        assert_eq!(config.playback_queue_frames, 500);
        assert_eq!(config.registry_ttl_seconds, 3600);
        assert!(config.max_concurrent_calls.is_none());
        assert_eq!(config.vad, VadProfiles::default());
        assert!(config.order_store_url.is_none());
        assert_eq!(config.order_store_timeout_ms, 5000);
        assert_eq!(config.address(), "0.0.0.0:8000");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "9100");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("REALTIME_VOICE", "shimmer");
            env::set_var("UPLINK_POLICY", "forward_while_ai_silent");
            env::set_var("PLAYBACK_QUEUE_FRAMES", "100");
            env::set_var("MAX_CONCURRENT_CALLS", "25");
            env::set_var("ORDER_STORE_URL", "http://orders.local:8080");
        }

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.realtime_voice, "shimmer");
        assert_eq!(config.uplink_policy, UplinkPolicy::ForwardWhileAiSilent);
        assert_eq!(config.playback_queue_frames, 100);
        assert_eq!(config.max_concurrent_calls, Some(25));
        assert_eq!(
            config.order_store_url.as_deref(),
            Some("http://orders.local:8080")
        );

        let realtime = config.realtime_config();
        assert_eq!(realtime.api_key, "sk-env");
        assert_eq!(realtime.voice, "shimmer");

        let bridge = config.bridge_settings();
        assert_eq!(bridge.playback_queue_frames, 100);
        assert_eq!(bridge.connect_timeout, Duration::from_secs(10));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid value for PORT"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_policy() {
        cleanup_env_vars();
        unsafe {
            env::set_var("UPLINK_POLICY", "never");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("UPLINK_POLICY"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_partial_tls_rejected() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TLS_CERT_PATH and TLS_KEY_PATH"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_queue() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PLAYBACK_QUEUE_FRAMES", "0");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("playback_queue_frames"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_url: "https://bridge.example.com"
  tls:
    cert_path: "/etc/cert.pem"
    key_path: "/etc/key.pem"

realtime:
  api_key: "sk-yaml"
  model: "gpt-4o-mini-realtime-preview"

bridge:
  registry_ttl_seconds: 600

vad:
  strict:
    peak_threshold: 8000

orders:
  url: "https://orders.example.com"
  timeout_ms: 2000
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.public_url.as_deref(),
            Some("https://bridge.example.com")
        );
        assert_eq!(
            config.tls,
            Some(TlsConfig {
                cert_path: PathBuf::from("/etc/cert.pem"),
                key_path: PathBuf::from("/etc/key.pem"),
            })
        );
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(config.realtime_model, "gpt-4o-mini-realtime-preview");
        assert_eq!(config.registry_ttl(), Duration::from_secs(600));
        assert_eq!(config.vad.strict.peak_threshold, 8000);
        assert_eq!(config.vad.normal, VadProfiles::default().normal);
        assert_eq!(config.order_store_timeout(), Duration::from_secs(2));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"

realtime:
  api_key: "yaml-key"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("PORT", "9000");
            env::set_var("OPENAI_API_KEY", "env-key");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.openai_api_key.as_deref(), Some("yaml-key"));
        // ENV value
        assert_eq!(config.port, 9000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_loose_strict_profile() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
vad:
  strict:
    mean_threshold: 100.0
"#,
        )
        .unwrap();

        let err = ServerConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Invalid VAD configuration"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_tls_disabled() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
            env::set_var("TLS_KEY_PATH", "/tmp/key.pem");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  tls:
    enabled: false
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert!(!config.is_tls_enabled());

        cleanup_env_vars();
    }
}
