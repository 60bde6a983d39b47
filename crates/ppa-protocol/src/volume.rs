//! Gain quantization for volume commands.
//!
//! The devices expose a −80dB..+20dB master gain. On the wire it travels
//! as a linear integer in `[0, 0x3e8]`; the API works in a normalized
//! `[0.0, 1.0]` range (0.0 = −80dB, 1.0 = +20dB). The mapping is lossy
//! with a quantization step of 1/1000.

/// Encoded value for +20dB (full scale).
pub const GAIN_FULL_SCALE: u32 = 0x3e8;

/// Routing path selecting the master input gain control:
/// position 0 / Input, position 3 / Gain.
pub const MASTER_INPUT_GAIN_PATH: [u8; 4] = [1, 0, 3, 6];

/// Quantize a normalized volume to its wire encoding. Out-of-range input
/// saturates rather than erroring.
pub fn encode_volume(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * GAIN_FULL_SCALE as f32).round() as u32
}

/// Inverse of [`encode_volume`], up to quantization error.
pub fn decode_volume(encoded: u32) -> f32 {
    encoded as f32 / GAIN_FULL_SCALE as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_volume_endpoints() {
        assert_eq!(encode_volume(0.0), 0);
        assert_eq!(encode_volume(1.0), 1000);
        assert_eq!(encode_volume(0.5), 500);
    }

    #[test]
    fn test_encode_volume_saturates() {
        assert_eq!(encode_volume(-0.25), 0);
        assert_eq!(encode_volume(1.5), 1000);
        assert_eq!(encode_volume(f32::NEG_INFINITY), 0);
        assert_eq!(encode_volume(f32::INFINITY), 1000);
    }

    #[test]
    fn test_roundtrip_within_quantization_error() {
        for i in 0..=100 {
            let v = i as f32 / 100.0;
            let back = decode_volume(encode_volume(v));
            assert!(
                (back - v).abs() <= 0.0005,
                "volume {v} came back as {back}"
            );
        }
    }
}
