//! Tagged detection outcome
//!
//! Detectors never fail on inconclusive input. They either produce a value
//! with a confidence score or say why nothing was detected.

use serde::Serialize;
use std::fmt;

/// Why a detector produced no value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum UndetectedReason {
    /// Fewer onsets than the tempo estimator needs
    TooFewOnsets { found: usize },
    /// Tempo still outside the plausible range after octave folding
    OutOfRange { bpm: f32 },
    /// Signal too short to fill a single analysis frame
    TooShort,
    /// No energy in the musical frequency range
    NoTonalEnergy,
    /// Every sample is zero
    Silent,
}

impl fmt::Display for UndetectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndetectedReason::TooFewOnsets { found } => write!(f, "too few onsets ({})", found),
            UndetectedReason::OutOfRange { bpm } => {
                write!(f, "tempo out of range ({:.1} BPM)", bpm)
            }
            UndetectedReason::TooShort => write!(f, "signal too short"),
            UndetectedReason::NoTonalEnergy => write!(f, "no tonal energy"),
            UndetectedReason::Silent => write!(f, "silent signal"),
        }
    }
}

/// Result of a single detector
#[derive(Debug, Clone, PartialEq)]
pub enum Detection<T> {
    /// A value was found with the given confidence (0.0 - 1.0)
    Detected { value: T, confidence: f32 },
    /// Nothing was found
    Undetected(UndetectedReason),
}

impl<T> Detection<T> {
    pub fn detected(value: T, confidence: f32) -> Self {
        Detection::Detected {
            value,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The detected value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Detection::Detected { value, .. } => Some(value),
            Detection::Undetected(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Detection::Detected { value, .. } => Some(value),
            Detection::Undetected(_) => None,
        }
    }

    /// Confidence score, 0.0 when undetected
    pub fn confidence(&self) -> f32 {
        match self {
            Detection::Detected { confidence, .. } => *confidence,
            Detection::Undetected(_) => 0.0,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Detection::Detected { .. })
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Detection<U> {
        match self {
            Detection::Detected { value, confidence } => Detection::Detected {
                value: f(value),
                confidence,
            },
            Detection::Undetected(reason) => Detection::Undetected(reason),
        }
    }
}
