//! Key detection using chromagram analysis
//!
//! Implements key-finding via chromagram correlation:
//! 1. Compute chromagram (12-bin pitch class distribution) via STFT
//! 2. Correlate with the 24 Krumhansl-Schmuckler key profiles
//! 3. Return the best matching key with confidence score

use crate::camelot::{Mode, MusicalKey};
use crate::chroma::{ChromaBuilder, ChromaVector};
use crate::detection::{Detection, UndetectedReason};
use crate::signal::AudioSignal;
use std::sync::OnceLock;

/// Krumhansl-Schmuckler major key profile
///
/// Index 0 = tonic.
pub const MAJOR_PROFILE: [f32; 12] = [
    6.35, // Tonic (I)
    2.23, // Minor 2nd
    3.48, // Major 2nd
    2.33, // Minor 3rd
    4.38, // Major 3rd
    4.09, // Perfect 4th
    2.52, // Tritone
    5.19, // Perfect 5th
    2.39, // Minor 6th
    3.66, // Major 6th
    2.29, // Minor 7th
    2.88, // Major 7th
];

/// Krumhansl-Schmuckler minor key profile
///
/// Index 0 = tonic.
pub const MINOR_PROFILE: [f32; 12] = [
    6.33, // Tonic (i)
    2.68, // Minor 2nd
    3.52, // Major 2nd
    5.38, // Minor 3rd
    2.60, // Major 3rd
    3.53, // Perfect 4th
    2.54, // Tritone
    4.75, // Perfect 5th
    3.98, // Minor 6th
    2.69, // Major 6th
    3.34, // Minor 7th
    3.17, // Major 7th
];

/// Reference chroma template for one key
#[derive(Debug, Clone, Copy)]
pub struct KeyProfile {
    pub key: MusicalKey,
    /// Weight per absolute pitch class (index 0 = C)
    pub weights: [f32; 12],
}

impl KeyProfile {
    /// Rotate the base template so its tonic weight lands on the key's root
    ///
    /// `weights[pc] = base[(pc - root) mod 12]`
    fn rotated(key: MusicalKey) -> Self {
        let base = match key.mode() {
            Mode::Major => &MAJOR_PROFILE,
            Mode::Minor => &MINOR_PROFILE,
        };
        let root = key.root_pitch_class() as usize;
        let mut weights = [0.0f32; 12];
        for (pc, w) in weights.iter_mut().enumerate() {
            *w = base[(pc + 12 - root) % 12];
        }
        Self { key, weights }
    }
}

/// The 24 key profiles, ordered C, Cm, Db, Dbm, ...
pub fn key_profiles() -> &'static [KeyProfile] {
    static PROFILES: OnceLock<Vec<KeyProfile>> = OnceLock::new();
    PROFILES.get_or_init(|| MusicalKey::all().map(KeyProfile::rotated).collect())
}

/// Correlation of two 12-element vectors
///
/// Both vectors are mean-centered and scaled to unit length before the dot
/// product, so the score lies in [-1, 1].
pub fn correlate(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let mean_a: f32 = a.iter().sum::<f32>() / 12.0;
    let mean_b: f32 = b.iter().sum::<f32>() / 12.0;

    let mut numerator = 0.0f32;
    let mut denom_a = 0.0f32;
    let mut denom_b = 0.0f32;

    for i in 0..12 {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        numerator += da * db;
        denom_a += da * da;
        denom_b += db * db;
    }

    let denom = (denom_a * denom_b).sqrt();
    if denom > 0.0 {
        numerator / denom
    } else {
        0.0
    }
}

/// Best matching key for a chroma vector with its raw score
///
/// Returns None for an all-zero or flat chroma vector.
pub fn match_key_profile(chroma: &ChromaVector) -> Option<(MusicalKey, f32)> {
    if chroma.is_zero() {
        return None;
    }

    let mut best: Option<(MusicalKey, f32)> = None;
    for profile in key_profiles() {
        let score = correlate(chroma.as_array(), &profile.weights);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((profile.key, score));
        }
    }
    best
}

/// Key detector with a reusable chroma builder
pub struct KeyDetector {
    sample_rate: u32,
    chroma: ChromaBuilder,
}

impl KeyDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chroma: ChromaBuilder::new(sample_rate),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Detect the key of a signal
    ///
    /// Confidence is `(score + 1) / 2` clamped to [0, 1].
    pub fn detect(&self, signal: &AudioSignal) -> Detection<MusicalKey> {
        if ChromaBuilder::frame_count(signal.len()) == 0 {
            return Detection::Undetected(UndetectedReason::TooShort);
        }
        if signal.sample_rate() != self.sample_rate {
            return KeyDetector::new(signal.sample_rate()).detect(signal);
        }

        let chroma = self.chroma.compute(signal);
        match match_key_profile(&chroma) {
            Some((key, score)) => Detection::detected(key, ((score + 1.0) / 2.0).clamp(0.0, 1.0)),
            None => Detection::Undetected(UndetectedReason::NoTonalEnergy),
        }
    }
}

/// Detect the key with a one-off detector
pub fn detect_key(signal: &AudioSignal) -> Detection<MusicalKey> {
    KeyDetector::new(signal.sample_rate()).detect(signal)
}
