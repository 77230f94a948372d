//! Waveform decimation for display
//!
//! Keeps every `factor`-th sample (first of each window, no averaging) so a
//! source of any length can be drawn from a bounded array.

/// Display cap in points
pub const DISPLAY_CAP: usize = 5_000;

/// `max(total / cap, 1)` using integer division
pub fn decimation_factor(total_samples: usize, cap: usize) -> usize {
    (total_samples / cap.max(1)).max(1)
}

/// Decimate `samples` for a display of about `cap` points.
///
/// Output length is `ceil(total / factor)`; with integer division of the
/// factor this can exceed `cap` by less than a factor of two.
pub fn decimate(samples: &[f32], cap: usize) -> Vec<f32> {
    let factor = decimation_factor(samples.len(), cap);
    samples.iter().step_by(factor).copied().collect()
}

/// First channel of an interleaved buffer
pub fn first_channel(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved.iter().step_by(channels).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_for_short_source() {
        assert_eq!(decimation_factor(100, DISPLAY_CAP), 1);
        assert_eq!(decimation_factor(0, DISPLAY_CAP), 1);
        assert_eq!(decimation_factor(10, 0), 10);
    }

    #[test]
    fn test_decimate_odd_length() {
        let input: Vec<f32> = (0..12_345).map(|i| i as f32).collect();
        assert_eq!(decimation_factor(input.len(), 5_000), 2);

        let output = decimate(&input, 5_000);
        assert_eq!(output.len(), 6_173);
        for (k, &v) in output.iter().enumerate() {
            assert_eq!(v, input[2 * k]);
        }
    }

    #[test]
    fn test_decimate_large_source_is_near_cap() {
        let input = vec![0.5_f32; 1_000_000];
        let output = decimate(&input, DISPLAY_CAP);
        assert_eq!(output.len(), DISPLAY_CAP);
    }

    #[test]
    fn test_short_source_is_unchanged() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(decimate(&input, DISPLAY_CAP), input);
    }

    #[test]
    fn test_first_channel() {
        let stereo = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        assert_eq!(first_channel(&stereo, 2), vec![1.0, 2.0, 3.0]);
        assert_eq!(first_channel(&stereo, 1), stereo.to_vec());
    }
}
