//! Fully buffered mono audio signal

use thiserror::Error;

/// Errors when constructing an [`AudioSignal`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Signal contains no samples")]
    Empty,
    #[error("Sample rate must be positive")]
    ZeroSampleRate,
}

/// Mono PCM samples at a fixed rate
///
/// Samples are nominally in [-1.0, 1.0]. The signal is never empty and the
/// sample rate is never zero.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Create a signal, validating the invariants
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, SignalError> {
        if sample_rate == 0 {
            return Err(SignalError::ZeroSampleRate);
        }
        if samples.is_empty() {
            return Err(SignalError::Empty);
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// True when every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}
