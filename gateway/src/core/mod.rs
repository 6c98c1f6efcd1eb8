pub mod bridge;
pub mod codec;
pub mod orders;
pub mod realtime;
pub mod registry;
pub mod telephony;
pub mod vad;

pub use bridge::{BridgeSettings, CallSummary, CallSupervisor, UplinkPolicy};
pub use orders::{HttpOrderStore, InMemoryOrderStore, OrderStore};
pub use realtime::{OpenAIRealtime, RealtimeConfig, RealtimeConnector, RealtimeError};
pub use registry::CallRegistry;
