//! Energy-envelope onset detection
//!
//! The envelope is the mean squared amplitude over 50 ms windows with a
//! 50% hop. An onset is a strict local maximum of the envelope that rises
//! above the envelope mean scaled by `1 + threshold`.

use crate::signal::AudioSignal;

/// Envelope window length in seconds
pub const ENVELOPE_WINDOW_SECS: f32 = 0.05;

/// Default relative threshold above the envelope mean
pub const DEFAULT_ONSET_THRESHOLD: f32 = 0.3;

/// Window and hop sizes (in samples) used for the energy envelope
pub fn envelope_geometry(sample_rate: u32) -> (usize, usize) {
    let window = ((sample_rate as f32 * ENVELOPE_WINDOW_SECS) as usize).max(2);
    (window, window / 2)
}

/// Compute the energy envelope (mean of squared samples per window)
pub fn energy_envelope(signal: &AudioSignal) -> Vec<f32> {
    let (window, hop) = envelope_geometry(signal.sample_rate());
    let samples = signal.samples();

    let mut envelope = Vec::with_capacity(samples.len() / hop + 1);
    let mut start = 0;
    while start + window <= samples.len() {
        let energy: f32 = samples[start..start + window].iter().map(|s| s * s).sum();
        envelope.push(energy / window as f32);
        start += hop;
    }
    envelope
}

/// Detect onset times (seconds) in a signal
pub fn detect_onsets(signal: &AudioSignal, threshold: f32) -> Vec<f32> {
    let envelope = energy_envelope(signal);
    if envelope.len() < 3 {
        return Vec::new();
    }

    let (_, hop) = envelope_geometry(signal.sample_rate());
    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let energy_threshold = mean * (1.0 + threshold);

    envelope
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2] && w[1] > energy_threshold)
        .map(|(i, _)| ((i + 1) * hop) as f32 / signal.sample_rate() as f32)
        .collect()
}
