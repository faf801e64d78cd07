//! Self-calibration for Cadence
//!
//! A [`Calibrator`] learns a [`CalibrationProfile`] from ground truth tracks;
//! a [`CalibratedAnalyzer`] applies the current profile to raw detector
//! output. Both share one [`SharedProfile`], which is only ever replaced
//! whole.

mod analyzer;
mod batch;
mod calibrator;
mod error;
mod ground_truth;
mod profile;
mod raw;

pub use analyzer::{calibrate_result, AnalysisResult, CalibratedAnalyzer, Confidence};
pub use batch::{BatchAnalyzer, BatchItem, BatchProgress};
pub use calibrator::{
    fit_bpm_multiplier, fit_key, fit_lufs_offset, score, Calibrator, KeyFit, TestResult,
    LUFS_ACCURACY_DB, MIN_GROUND_TRUTH, MIN_LUFS_ENTRIES,
};
pub use error::CalibrationError;
pub use ground_truth::{GroundTruth, GroundTruthEntry, GroundTruthExport};
pub use profile::{
    load_profile, save_profile, BpmCalibration, CalibratedBpm, CalibrationProfile,
    CalibrationStats, CalibrationStatus, ConfusionMatrix, KeyCalibration, LufsCalibration,
    SharedProfile, DEFAULT_MULTIPLIERS, PROFILE_KEY, PROFILE_VERSION,
};
pub use raw::{RawAnalysis, RawAnalyze, RawAnalyzer};
