//! Calibrated analysis façade

use crate::profile::{CalibratedBpm, CalibrationProfile, SharedProfile};
use crate::raw::{RawAnalysis, RawAnalyze};
use cadence_analysis::{Mode, MusicalKey};
use cadence_library::DecodeError;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-detector confidence
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Confidence {
    pub bpm: f32,
    pub key: f32,
}

/// What a tagging UI receives for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Always within 60-220 when present
    pub bpm: Option<u32>,
    pub bpm_confidence: f32,
    pub key: Option<String>,
    pub mode: Option<Mode>,
    pub camelot: Option<String>,
    pub lufs: Option<f32>,
    pub loudness_range: f32,
    pub confidence: Confidence,
    /// "high" once a learned tempo multiplier was applied
    pub bpm_label: &'static str,
    pub bpm_candidates: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Result for a file that could not be decoded
    pub fn unanalyzable(error: impl Into<String>) -> Self {
        Self {
            bpm_label: "medium",
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Raw pipeline plus the current calibration profile
///
/// Each call reads one profile snapshot, so a calibration finishing mid-call
/// never mixes old and new corrections in one result.
#[derive(Clone)]
pub struct CalibratedAnalyzer {
    raw: Arc<dyn RawAnalyze>,
    profile: SharedProfile,
}

impl CalibratedAnalyzer {
    pub fn new(raw: Arc<dyn RawAnalyze>, profile: SharedProfile) -> Self {
        Self { raw, profile }
    }

    pub fn profile(&self) -> Arc<CalibrationProfile> {
        self.profile.snapshot()
    }

    pub fn apply_calibrated_bpm(&self, raw_bpm: u32, candidates: &[u32]) -> CalibratedBpm {
        self.profile.snapshot().apply_bpm(raw_bpm, candidates)
    }

    pub fn apply_calibrated_key(&self, raw_key: MusicalKey) -> MusicalKey {
        self.profile.snapshot().apply_key(raw_key)
    }

    pub fn apply_calibrated_lufs(&self, raw_lufs: f32) -> f32 {
        self.profile.snapshot().apply_lufs(raw_lufs)
    }

    /// Analyze a file; decode failures come back as a result with `error` set
    pub fn analyze(&self, path: &Path) -> AnalysisResult {
        self.analyze_strict(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Track is unanalyzable");
            AnalysisResult::unanalyzable(e.to_string())
        })
    }

    /// Analyze a file, returning decode failures as errors
    pub fn analyze_strict(&self, path: &Path) -> Result<AnalysisResult, DecodeError> {
        let raw = self.raw.analyze_raw(path)?;
        let result = calibrate_result(&self.profile.snapshot(), raw);
        debug!(path = %path.display(), bpm = ?result.bpm, key = ?result.key, "Analyzed");
        Ok(result)
    }
}

/// Apply `profile` to raw detector output
pub fn calibrate_result(profile: &CalibrationProfile, raw: RawAnalysis) -> AnalysisResult {
    let alternatives: Vec<u32> = raw.bpm_candidates.iter().map(|c| c.value).collect();
    let tempo = raw.bpm.map(|bpm| profile.apply_bpm(bpm, &alternatives));

    let (bpm, bpm_label, bpm_candidates) = match tempo {
        Some(tempo) => (
            profile.bpm.fit_to_range(tempo.bpm),
            tempo.confidence,
            tempo
                .candidates
                .into_iter()
                .filter_map(|c| profile.bpm.fit_to_range(c))
                .collect(),
        ),
        None => (None, "medium", Vec::new()),
    };

    let key = raw.key.map(|k| profile.apply_key(k));

    AnalysisResult {
        bpm,
        bpm_confidence: if bpm.is_some() { raw.bpm_confidence } else { 0.0 },
        key: key.map(|k| k.to_string()),
        mode: key.map(|k| k.mode()),
        camelot: key.map(|k| k.camelot().to_string()),
        lufs: raw.lufs.map(|l| profile.apply_lufs(l)),
        loudness_range: raw.loudness_range,
        confidence: Confidence {
            bpm: if bpm.is_some() { raw.bpm_confidence } else { 0.0 },
            key: if key.is_some() { raw.key_confidence } else { 0.0 },
        },
        bpm_label,
        bpm_candidates,
        error: None,
    }
}
