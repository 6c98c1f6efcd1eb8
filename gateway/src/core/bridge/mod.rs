//! Telephony ↔ realtime call bridge.
//!
//! # Architecture
//!
//! Each call runs three tasks over one [`SharedSession`]:
//!
//! - [`UplinkRelay`]: carrier events in, caller audio to the assistant,
//!   local barge-in detection
//! - [`DownlinkRelay`]: assistant events in, audio framed into the playback
//!   queue, tool calls dispatched
//! - [`run_pacer`]: one 20ms frame out to the carrier per tick
//!
//! [`CallSupervisor`] opens the upstream connection, starts the tasks and
//! tears everything down when the first one ends.

pub mod barge_in;
pub mod downlink;
pub mod pacer;
pub mod session;
pub mod supervisor;
pub mod tools;
pub mod uplink;

pub use barge_in::{BargeInController, BargeInState, InterruptSource};
pub use downlink::DownlinkRelay;
pub use pacer::{FRAME_BYTES, FRAME_INTERVAL, FrameAssembler, PlaybackQueue, run_pacer};
pub use session::{CallSession, SessionStats, SharedSession};
pub use supervisor::{BridgeSettings, BridgeTask, CallSummary, CallSupervisor};
pub use tools::{ToolDispatcher, ToolResult};
pub use uplink::{TelephonyInbound, UplinkPolicy, UplinkRelay};
