//! Audio analysis for Cadence
//!
//! Provides onset detection, tempo estimation, chromagram and key
//! detection, loudness estimation and Camelot key notation. Every detector
//! works on a fully buffered mono [`AudioSignal`] and reports a
//! [`Detection`] rather than failing on inconclusive input.

mod camelot;
mod chroma;
mod detection;
mod key;
mod loudness;
mod onset;
mod pipeline;
mod signal;
mod tempo;

pub use camelot::{CamelotKey, Mode, MusicalKey};
pub use chroma::{compute_chromagram, pitch_class, ChromaBuilder, ChromaVector};
pub use detection::{Detection, UndetectedReason};
pub use key::{correlate, detect_key, key_profiles, match_key_profile, KeyDetector, KeyProfile};
pub use loudness::{estimate_loudness, loudness_range, LoudnessEstimate};
pub use onset::{detect_onsets, energy_envelope, DEFAULT_ONSET_THRESHOLD};
pub use pipeline::{SignalAnalysis, SignalAnalyzer};
pub use signal::{AudioSignal, SignalError};
pub use tempo::{
    detect_bpm, fold_octave, BpmCandidate, IntervalHistogram, TempoDetector, TempoEstimate,
    MAX_BPM, MIN_BPM,
};
