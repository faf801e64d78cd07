//! Raw (uncalibrated) analysis of a decoded signal
//!
//! Tempo and key detection are independent, so they run on two scoped
//! threads borrowing the same signal.

use crate::camelot::MusicalKey;
use crate::detection::Detection;
use crate::key::KeyDetector;
use crate::loudness::{estimate_loudness, LoudnessEstimate};
use crate::signal::AudioSignal;
use crate::tempo::{TempoDetector, TempoEstimate};
use std::thread;
use tracing::debug;

/// Outcome of every detector for one signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAnalysis {
    pub tempo: Detection<TempoEstimate>,
    pub key: Detection<MusicalKey>,
    pub loudness: Detection<LoudnessEstimate>,
}

impl SignalAnalysis {
    pub fn bpm(&self) -> Option<u32> {
        self.tempo.value().map(|t| t.bpm)
    }

    pub fn key(&self) -> Option<MusicalKey> {
        self.key.value().copied()
    }

    pub fn lufs(&self) -> Option<f32> {
        self.loudness.value().map(|l| l.lufs)
    }
}

/// Runs all detectors over a signal
#[derive(Debug, Clone, Copy)]
pub struct SignalAnalyzer {
    tempo: TempoDetector,
}

impl Default for SignalAnalyzer {
    fn default() -> Self {
        Self {
            tempo: TempoDetector::default(),
        }
    }
}

impl SignalAnalyzer {
    pub fn new(onset_threshold: f32) -> Self {
        Self {
            tempo: TempoDetector::new(onset_threshold),
        }
    }

    pub fn analyze(&self, signal: &AudioSignal) -> SignalAnalysis {
        let tempo_detector = self.tempo;
        let (tempo, key) = thread::scope(|scope| {
            let tempo = scope.spawn(move || tempo_detector.detect(signal));
            let key = KeyDetector::new(signal.sample_rate()).detect(signal);
            let tempo = match tempo.join() {
                Ok(tempo) => tempo,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (tempo, key)
        });
        let loudness = estimate_loudness(signal);

        debug!(
            bpm = ?tempo.value().map(|t| t.bpm),
            key = ?key.value().map(|k| k.to_string()),
            lufs = ?loudness.value().map(|l| l.lufs),
            "Signal analyzed"
        );

        SignalAnalysis {
            tempo,
            key,
            loudness,
        }
    }
}
