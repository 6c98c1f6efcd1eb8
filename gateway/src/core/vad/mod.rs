//! Voice Activity Detection (VAD) module
//!
//! Energy-based speech detection over 8 kHz μ-law audio. Two threshold sets
//! are kept per call: a normal one for ordinary speech, and a strict one used
//! while the assistant is talking so that line echo does not count as the
//! caller barging in.
//!
//! # Example
//!
//! ```rust
//! use callbridge_gateway::core::vad::{VadMode, VadProfiles, detect_speech};
//!
//! let profiles = VadProfiles::default();
//! let silence = vec![0xFFu8; 160];
//! assert!(!detect_speech(&silence, profiles.get(VadMode::Strict)));
//! ```

pub mod config;
pub mod energy;

pub use config::{VadMode, VadProfile, VadProfiles};
pub use energy::{ChunkEnergy, detect_speech};
