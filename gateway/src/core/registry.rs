//! Call-to-phone registry.
//!
//! The voice webhook learns the caller's number before the media stream
//! exists; the stream only carries a call identity. Entries are written by the
//! webhook, read once when the stream starts, and removed when the session
//! ends. A periodic sweep drops entries whose stream never arrived.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Phone recorded when a call cannot be resolved.
pub const UNKNOWN_PHONE: &str = "unknown";

#[derive(Debug, Clone)]
struct RegistryEntry {
    phone: String,
    registered_at: Instant,
}

/// Concurrent map of call identity to caller phone.
#[derive(Debug, Default)]
pub struct CallRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the caller for a call, replacing any previous entry.
    pub fn register(&self, call_id: impl Into<String>, phone: impl Into<String>) {
        let call_id = call_id.into();
        debug!(call_id = %call_id, "Registering call");
        self.entries.insert(
            call_id,
            RegistryEntry {
                phone: phone.into(),
                registered_at: Instant::now(),
            },
        );
    }

    /// Caller phone for a call, if known.
    pub fn lookup(&self, call_id: &str) -> Option<String> {
        self.entries.get(call_id).map(|entry| entry.phone.clone())
    }

    /// Caller phone for a call, or [`UNKNOWN_PHONE`].
    pub fn resolve(&self, call_id: Option<&str>) -> String {
        call_id
            .and_then(|id| self.lookup(id))
            .unwrap_or_else(|| UNKNOWN_PHONE.to_string())
    }

    /// Drop the entry for a finished call.
    pub fn remove(&self, call_id: &str) -> Option<String> {
        self.entries.remove(call_id).map(|(_, entry)| entry.phone)
    }

    /// Drop entries registered more than `ttl` before `now`. Returns how many were dropped.
    pub fn evict_expired(&self, ttl: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.registered_at) <= ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`evict_expired`](Self::evict_expired) every `interval` until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, ttl: Duration, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = registry.evict_expired(ttl, Instant::now());
                if evicted > 0 {
                    info!(evicted, remaining = registry.len(), "Evicted stale call registrations");
                }
            }
        })
    }
}
