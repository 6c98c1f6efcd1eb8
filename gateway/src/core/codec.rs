//! G.711 μ-law companding.
//!
//! The telephony leg carries 8 kHz μ-law; the only linear audio this crate ever
//! needs is for energy measurement, so decoding is the hot path and encoding is
//! kept for building synthetic signals.

/// Bias added before companding.
const MULAW_BIAS: i32 = 0x84;
/// Largest magnitude representable before clipping.
const MULAW_CLIP: i32 = 32635;

/// Telephony sample rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 8000;

/// Expand one μ-law byte to a signed 16-bit linear sample.
#[inline]
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let companded = !byte;
    let sign = companded & 0x80;
    let exponent = ((companded >> 4) & 0x07) as i32;
    let mantissa = (companded & 0x0F) as i32;

    let magnitude = (((mantissa << 1) | 0x21) << (exponent + 2)) - MULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Compress one signed 16-bit linear sample to μ-law.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut value = sample as i32;
    let sign = if value < 0 {
        value = -value;
        0x80
    } else {
        0x00
    };
    value = value.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && value & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (value >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Expand a μ-law buffer into linear samples.
pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}

/// Compress linear samples into a μ-law buffer.
pub fn encode_mulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}
