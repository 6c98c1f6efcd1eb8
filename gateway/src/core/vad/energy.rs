//! Energy-based speech detection over μ-law chunks.

use super::config::VadProfile;
use crate::core::codec::mulaw_to_linear;

/// Amplitude statistics of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChunkEnergy {
    pub peak: i32,
    pub mean_abs: f32,
    /// Fraction of samples whose magnitude exceeds the profile's loud amplitude
    pub loud_ratio: f32,
}

impl ChunkEnergy {
    /// Measure a μ-law chunk against a loud-sample amplitude.
    pub fn measure(chunk: &[u8], loud_amplitude: i32) -> Self {
        if chunk.is_empty() {
            return Self::default();
        }

        let mut peak = 0i32;
        let mut total = 0u64;
        let mut loud = 0usize;
        for &byte in chunk {
            let magnitude = (mulaw_to_linear(byte) as i32).abs();
            peak = peak.max(magnitude);
            total += magnitude as u64;
            if magnitude > loud_amplitude {
                loud += 1;
            }
        }

        let count = chunk.len() as f32;
        Self {
            peak,
            mean_abs: total as f32 / count,
            loud_ratio: loud as f32 / count,
        }
    }
}

/// Classify a μ-law chunk as speech or not.
///
/// Speech when either the peak and loud fraction both clear the primary
/// thresholds, or the mean and loud fraction clear the secondary ones.
pub fn detect_speech(chunk: &[u8], profile: &VadProfile) -> bool {
    if chunk.len() < profile.min_chunk_bytes {
        return false;
    }

    let energy = ChunkEnergy::measure(chunk, profile.loud_amplitude);
    let primary =
        energy.peak > profile.peak_threshold && energy.loud_ratio > profile.loud_ratio_threshold;
    let secondary = energy.mean_abs > profile.mean_threshold
        && energy.loud_ratio > profile.secondary_ratio_threshold;

    primary || secondary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::linear_to_mulaw;

    fn tone(amplitude: i16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let sample = if i % 2 == 0 { amplitude } else { -amplitude };
                linear_to_mulaw(sample)
            })
            .collect()
    }

    #[test]
    fn test_silence_is_not_speech() {
        let silence = vec![0xFFu8; 160];
        assert!(!detect_speech(&silence, &VadProfile::normal()));
        assert!(!detect_speech(&silence, &VadProfile::strict()));
    }

    #[test]
    fn test_negative_zero_silence_is_not_speech() {
        let silence = vec![0x7Fu8; 320];
        assert!(!detect_speech(&silence, &VadProfile::normal()));
        assert!(!detect_speech(&silence, &VadProfile::strict()));
    }

    #[test]
    fn test_loud_chunk_is_speech() {
        let loud = tone(8000, 160);
        assert!(detect_speech(&loud, &VadProfile::normal()));
        assert!(detect_speech(&loud, &VadProfile::strict()));
    }

    #[test]
    fn test_moderate_chunk_only_trips_normal() {
        let moderate = tone(1400, 160);
        assert!(detect_speech(&moderate, &VadProfile::normal()));
        assert!(!detect_speech(&moderate, &VadProfile::strict()));
    }

    #[test]
    fn test_short_chunk_is_never_speech() {
        let loud = tone(20000, 40);
        assert!(!detect_speech(&loud, &VadProfile::normal()));

        let loud = tone(20000, 100);
        assert!(detect_speech(&loud, &VadProfile::normal()));
        assert!(!detect_speech(&loud, &VadProfile::strict()));
    }

    #[test]
    fn test_single_spike_is_not_speech() {
        let mut chunk = vec![0xFFu8; 160];
        chunk[10] = linear_to_mulaw(20000);
        assert!(!detect_speech(&chunk, &VadProfile::normal()));
    }

    #[test]
    fn test_measure() {
        let energy = ChunkEnergy::measure(&[0xFF, 0xFF, 0x80, 0x00], 1000);
        assert_eq!(energy.peak, 32124);
        assert_eq!(energy.loud_ratio, 0.5);
        assert_eq!(energy.mean_abs, 32124.0 * 2.0 / 4.0);
        assert_eq!(ChunkEnergy::measure(&[], 1000), ChunkEnergy::default());
    }
}
