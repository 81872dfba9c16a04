//! ITU-T G.711 μ-law codec.
//!
//! Telephony carriers deliver 8 kHz mono μ-law; the realtime provider speaks
//! PCM16. Each μ-law byte maps to one 16-bit sample.

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encode one linear PCM16 sample as μ-law.
#[inline]
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let magnitude = magnitude.min(CLIP) + BIAS;

    // Segment is the position of the highest set bit above bit 7.
    let exponent = 31 - (((magnitude >> 7) as u32) | 1).leading_zeros() as i32;
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    !(sign | (exponent << 4) | mantissa) as u8
}

/// Decode one μ-law byte to a linear PCM16 sample.
#[inline]
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let value = !byte;
    let sign = value & 0x80;
    let exponent = ((value >> 4) & 0x07) as i32;
    let mantissa = (value & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Decode a μ-law buffer to PCM16 samples.
pub fn ulaw_decode(input: &[u8]) -> Vec<i16> {
    input.iter().copied().map(ulaw_to_linear).collect()
}

/// Encode PCM16 samples as μ-law bytes.
pub fn ulaw_encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().copied().map(linear_to_ulaw).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        assert_eq!(ulaw_to_linear(0xFF), 0);
        assert_eq!(ulaw_to_linear(0x7F), 0);
        assert_eq!(ulaw_to_linear(0x00), -32124);
        assert_eq!(ulaw_to_linear(0x80), 32124);

        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(32124), 0x80);
        assert_eq!(linear_to_ulaw(-32124), 0x00);
    }

    #[test]
    fn test_sign_symmetry() {
        for byte in 0x00u8..0x7F {
            assert_eq!(ulaw_to_linear(byte), -ulaw_to_linear(byte | 0x80));
        }
    }

    #[test]
    fn test_encode_of_decode_is_identity() {
        // 0x7F is negative zero and re-encodes as positive zero.
        for byte in (0u8..=255).filter(|b| *b != 0x7F) {
            assert_eq!(linear_to_ulaw(ulaw_to_linear(byte)), byte, "byte {byte:#04x}");
        }
        assert_eq!(linear_to_ulaw(ulaw_to_linear(0x7F)), 0xFF);
    }

    #[test]
    fn test_extremes_clip() {
        assert_eq!(linear_to_ulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_ulaw(i16::MIN), 0x00);
    }

    #[test]
    fn test_quantization_error_is_bounded() {
        // Largest segment step is 1024 for |x| near full scale.
        for sample in (-32000i16..32000).step_by(97) {
            let restored = ulaw_to_linear(linear_to_ulaw(sample));
            assert!(
                (restored as i32 - sample as i32).abs() <= 1024,
                "sample {sample} restored as {restored}"
            );
        }
    }

    #[test]
    fn test_buffer_helpers_preserve_length() {
        let bytes = vec![0xFF, 0x00, 0x80, 0x7F];
        let samples = ulaw_decode(&bytes);
        assert_eq!(samples, vec![0, -32124, 32124, 0]);
        assert_eq!(ulaw_encode(&samples), vec![0xFF, 0x00, 0x80, 0xFF]);
    }
}
