use std::path::PathBuf;

use super::env::load_from_env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Environment configuration with optional YAML overrides applied on top.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if server.public_url.is_some() {
            config.public_url = server.public_url;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                _ => match (tls.cert_path, tls.key_path) {
                    (Some(cert), Some(key)) => {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    }
                    (None, None) if tls.enabled.is_none() => {}
                    _ => {
                        return Err(
                            "server.tls requires both cert_path and key_path when enabled".into(),
                        );
                    }
                },
            }
        }
    }

    if let Some(realtime) = yaml.realtime {
        if realtime.api_key.is_some() {
            config.openai_api_key = realtime.api_key;
        }
        if let Some(url) = realtime.url {
            config.realtime_url = url;
        }
        if let Some(model) = realtime.model {
            config.realtime_model = model;
        }
        if let Some(voice) = realtime.voice {
            config.realtime_voice = voice;
        }
        if realtime.instructions.is_some() {
            config.assistant_instructions = realtime.instructions;
        }
        if let Some(timeout) = realtime.connect_timeout_ms {
            config.realtime_connect_timeout_ms = timeout;
        }
    }

    if let Some(bridge) = yaml.bridge {
        if let Some(policy) = bridge.uplink_policy {
            config.uplink_policy = policy;
        }
        if let Some(frames) = bridge.playback_queue_frames {
            config.playback_queue_frames = frames;
        }
        if let Some(ttl) = bridge.registry_ttl_seconds {
            config.registry_ttl_seconds = ttl;
        }
        if bridge.max_concurrent_calls.is_some() {
            config.max_concurrent_calls = bridge.max_concurrent_calls;
        }
    }

    if let Some(vad) = yaml.vad {
        if let Some(normal) = vad.normal {
            normal.apply_to(&mut config.vad.normal);
        }
        if let Some(strict) = vad.strict {
            strict.apply_to(&mut config.vad.strict);
        }
    }

    if let Some(orders) = yaml.orders {
        if orders.url.is_some() {
            config.order_store_url = orders.url;
        }
        if let Some(timeout) = orders.timeout_ms {
            config.order_store_timeout_ms = timeout;
        }
    }

    Ok(config)
}
