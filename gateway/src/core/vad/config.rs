//! VAD configuration types

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Which threshold set to evaluate a chunk against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VadMode {
    /// Ordinary speech detection
    #[default]
    Normal,
    /// High-confidence detection used while the assistant is talking, so that
    /// its own echo on the line does not count as the caller interrupting
    Strict,
}

impl std::fmt::Display for VadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VadMode::Normal => write!(f, "normal"),
            VadMode::Strict => write!(f, "strict"),
        }
    }
}

/// Thresholds for the energy detector.
///
/// Amplitudes are on the linear 16-bit scale after μ-law expansion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadProfile {
    /// Chunks shorter than this are never speech
    pub min_chunk_bytes: usize,

    /// A sample counts as "loud" when its magnitude exceeds this
    pub loud_amplitude: i32,

    /// Peak magnitude required by the primary rule
    pub peak_threshold: i32,

    /// Loud-sample fraction required by the primary rule (0.0 - 1.0)
    pub loud_ratio_threshold: f32,

    /// Mean magnitude required by the secondary rule
    pub mean_threshold: f32,

    /// Loud-sample fraction required by the secondary rule (0.0 - 1.0)
    pub secondary_ratio_threshold: f32,
}

impl VadProfile {
    /// Defaults for ordinary speech detection.
    pub const fn normal() -> Self {
        Self {
            min_chunk_bytes: 80,
            loud_amplitude: 1000,
            peak_threshold: 2000,
            loud_ratio_threshold: 0.10,
            mean_threshold: 500.0,
            secondary_ratio_threshold: 0.05,
        }
    }

    /// Defaults for barge-in detection.
    pub const fn strict() -> Self {
        Self {
            min_chunk_bytes: 160,
            loud_amplitude: 2500,
            peak_threshold: 6000,
            loud_ratio_threshold: 0.20,
            mean_threshold: 1500.0,
            secondary_ratio_threshold: 0.10,
        }
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<()> {
        if self.min_chunk_bytes == 0 {
            anyhow::bail!("VAD min_chunk_bytes must be greater than 0");
        }
        if self.loud_amplitude <= 0 || self.peak_threshold <= 0 {
            anyhow::bail!("VAD amplitude thresholds must be greater than 0");
        }
        if self.mean_threshold < 0.0 {
            anyhow::bail!("VAD mean_threshold must not be negative");
        }
        for (name, ratio) in [
            ("loud_ratio_threshold", self.loud_ratio_threshold),
            ("secondary_ratio_threshold", self.secondary_ratio_threshold),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                anyhow::bail!("VAD {name} must be between 0.0 and 1.0");
            }
        }
        Ok(())
    }
}

/// Both detection profiles used by a call session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadProfiles {
    pub normal: VadProfile,
    pub strict: VadProfile,
}

impl Default for VadProfiles {
    fn default() -> Self {
        Self {
            normal: VadProfile::normal(),
            strict: VadProfile::strict(),
        }
    }
}

impl VadProfiles {
    /// Get the profile for a mode
    pub fn get(&self, mode: VadMode) -> &VadProfile {
        match mode {
            VadMode::Normal => &self.normal,
            VadMode::Strict => &self.strict,
        }
    }

    /// Validate both profiles and that strict is never easier to trigger than normal
    pub fn validate(&self) -> Result<()> {
        self.normal.validate()?;
        self.strict.validate()?;

        let (n, s) = (&self.normal, &self.strict);
        if s.min_chunk_bytes < n.min_chunk_bytes
            || s.loud_amplitude < n.loud_amplitude
            || s.peak_threshold < n.peak_threshold
            || s.loud_ratio_threshold < n.loud_ratio_threshold
            || s.mean_threshold < n.mean_threshold
            || s.secondary_ratio_threshold < n.secondary_ratio_threshold
        {
            anyhow::bail!("VAD strict profile must be at least as demanding as the normal profile");
        }
        Ok(())
    }
}
