/// Resample mono PCM16 between rates.
///
/// Upsampling uses linear interpolation. Downsampling averages the input
/// samples covered by each output sample.
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;
    let mut output = Vec::with_capacity(out_len);

    if to_rate > from_rate {
        for i in 0..out_len {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let a = samples[idx.min(last)] as f64;
            let b = samples[(idx + 1).min(last)] as f64;
            output.push((a + (b - a) * frac).round() as i16);
        }
    } else {
        for i in 0..out_len {
            let start = (i as f64 * step).floor() as usize;
            let end = (((i + 1) as f64 * step).floor() as usize).clamp(start + 1, samples.len());
            let window = &samples[start.min(last)..end];
            let sum: i64 = window.iter().map(|s| *s as i64).sum();
            output.push((sum / window.len() as i64) as i16);
        }
    }

    output
}

/// Little-endian PCM16 bytes to samples. A trailing odd byte is dropped.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Samples to little-endian PCM16 bytes.
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_copy() {
        let input = vec![1, 2, 3];
        assert_eq!(resample_linear(&input, 8000, 8000), input);
        assert!(resample_linear(&[], 8000, 24000).is_empty());
    }

    #[test]
    fn test_upsample_triples_length_and_interpolates() {
        let output = resample_linear(&[0, 300, 600], 8000, 24000);
        assert_eq!(output.len(), 9);
        assert_eq!(&output[..4], &[0, 100, 200, 300]);
        // Samples past the last input hold its value.
        assert_eq!(output[8], 600);
    }

    #[test]
    fn test_downsample_averages_windows() {
        let input = [3, 6, 9, 30, 60, 90];
        let output = resample_linear(&input, 24000, 8000);
        assert_eq!(output, vec![6, 60]);
    }

    #[test]
    fn test_constant_signal_survives_round_trip() {
        let input = vec![1234i16; 160];
        let up = resample_linear(&input, 8000, 24000);
        let down = resample_linear(&up, 24000, 8000);
        assert_eq!(down, input);
    }

    #[test]
    fn test_odd_byte_dropped() {
        assert_eq!(pcm16_from_le_bytes(&[0x01, 0x00, 0xFF]), vec![1]);
        assert_eq!(pcm16_to_le_bytes(&[-2]), vec![0xFE, 0xFF]);
    }
}
