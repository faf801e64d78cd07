//! Calibration error types

use cadence_library::StoreError;
use thiserror::Error;

/// Errors that can occur while calibrating or persisting calibration data
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Need at least {required} ground truth tracks, have {available}")]
    InsufficientGroundTruth { required: usize, available: usize },
    #[error("No ground truth track could be analyzed")]
    NoUsableResults,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
