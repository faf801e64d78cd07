//! Loudness approximation
//!
//! Uses `-23 + 20 * log10(rms)` as a rough integrated loudness in LUFS. The
//! offset against a real meter is exactly what calibration learns, so a
//! simple estimate is enough here.

use crate::detection::{Detection, UndetectedReason};
use crate::signal::AudioSignal;

/// Window used for the loudness range estimate
pub const RANGE_WINDOW_SECS: f32 = 3.0;

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

fn rms_to_lufs(rms: f32) -> f32 {
    -23.0 + 20.0 * rms.log10()
}

/// Loudness estimate for a signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessEstimate {
    /// Integrated loudness approximation (LUFS)
    pub lufs: f32,
    /// Spread between the 95th and 10th percentile of 3 s window loudness (LU)
    pub range: f32,
}

/// Estimate integrated loudness and loudness range
pub fn estimate_loudness(signal: &AudioSignal) -> Detection<LoudnessEstimate> {
    let level = rms(signal.samples());
    if level <= 0.0 {
        return Detection::Undetected(UndetectedReason::Silent);
    }

    Detection::detected(
        LoudnessEstimate {
            lufs: rms_to_lufs(level),
            range: loudness_range(signal),
        },
        1.0,
    )
}

/// Loudness range over 3 second windows; silent windows are skipped
pub fn loudness_range(signal: &AudioSignal) -> f32 {
    let window = (signal.sample_rate() as f32 * RANGE_WINDOW_SECS) as usize;
    if window == 0 {
        return 0.0;
    }

    let mut values: Vec<f32> = signal
        .samples()
        .chunks_exact(window)
        .map(rms)
        .filter(|&r| r > 0.0)
        .map(rms_to_lufs)
        .collect();
    if values.len() < 2 {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let high = values[((values.len() as f32 * 0.95) as usize).min(values.len() - 1)];
    let low = values[(values.len() as f32 * 0.1) as usize];
    high - low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_square() {
        let samples: Vec<f32> = (0..22050).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let signal = AudioSignal::new(samples, 22050).unwrap();
        let estimate = estimate_loudness(&signal).into_value().unwrap();
        assert!((estimate.lufs - (-23.0)).abs() < 1e-4);
    }

    #[test]
    fn test_half_amplitude_is_six_db_quieter() {
        let signal = AudioSignal::new(vec![0.5; 22050], 22050).unwrap();
        let estimate = estimate_loudness(&signal).into_value().unwrap();
        assert!((estimate.lufs - (-29.0206)).abs() < 1e-3);
    }

    #[test]
    fn test_silence_is_undetected() {
        let signal = AudioSignal::new(vec![0.0; 22050], 22050).unwrap();
        assert_eq!(
            estimate_loudness(&signal),
            Detection::Undetected(UndetectedReason::Silent)
        );
    }

    #[test]
    fn test_range_of_steady_signal_is_zero() {
        let signal = AudioSignal::new(vec![0.25; 22050 * 12], 22050).unwrap();
        assert!(loudness_range(&signal).abs() < 1e-4);
    }

    #[test]
    fn test_range_of_two_levels() {
        let mut samples = vec![0.5f32; 100 * 9];
        samples.extend(vec![0.05f32; 100 * 9]);
        // 100 Hz: 3 windows loud then 3 windows quiet
        let signal = AudioSignal::new(samples, 100).unwrap();
        assert!((loudness_range(&signal) - 20.0).abs() < 1e-3);
    }
}
