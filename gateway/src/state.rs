//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::bridge::CallSupervisor;
use crate::core::orders::{HttpOrderStore, InMemoryOrderStore, OrderStore};
use crate::core::realtime::{OpenAIRealtime, RealtimeConnector};
use crate::core::registry::CallRegistry;

/// Why a new call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
}

/// A slot held by an active media stream. Released on drop.
#[derive(Debug)]
pub struct CallPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<CallRegistry>,
    pub supervisor: CallSupervisor,
    active_calls: Arc<AtomicUsize>,
}

impl AppState {
    /// Build state with the production connector and the configured order store.
    pub fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let connector = OpenAIRealtime::new(config.realtime_config())
            .context("OPENAI_API_KEY is required to bridge calls")?;

        let store: Arc<dyn OrderStore> = match &config.order_store_url {
            Some(url) => {
                info!(url = %url, "Using HTTP order store");
                Arc::new(
                    HttpOrderStore::new(url, config.order_store_timeout())
                        .context("Failed to build order store client")?,
                )
            }
            None => {
                info!("No order store configured, keeping orders in memory");
                Arc::new(InMemoryOrderStore::new())
            }
        };

        Ok(Self::with_components(config, Arc::new(connector), store))
    }

    /// Build state around explicit collaborators.
    pub fn with_components(
        config: ServerConfig,
        connector: Arc<dyn RealtimeConnector>,
        store: Arc<dyn OrderStore>,
    ) -> Arc<Self> {
        let registry = Arc::new(CallRegistry::new());
        let supervisor = CallSupervisor::new(
            config.bridge_settings(),
            connector,
            store,
            Arc::clone(&registry),
        );

        Arc::new(Self {
            config,
            registry,
            supervisor,
            active_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of media streams currently bridged.
    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Acquire)
    }

    /// Reserve a slot for a new media stream.
    pub fn try_acquire_call(&self) -> Result<CallPermit, ConnectionLimitError> {
        let limit = self.config.max_concurrent_calls.unwrap_or(usize::MAX);
        self.active_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;

        Ok(CallPermit {
            active: Arc::clone(&self.active_calls),
        })
    }
}
