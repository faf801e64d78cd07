//! Learns a correction profile from ground truth
//!
//! A run analyzes every ground truth file with the raw pipeline, fits a tempo
//! multiplier, a relative major/minor fix and a loudness offset, scores the
//! result, then persists and publishes the new profile in one swap.

use crate::error::CalibrationError;
use crate::ground_truth::{GroundTruth, GroundTruthEntry, GroundTruthExport};
use crate::profile::{
    save_profile, BpmCalibration, CalibrationProfile, CalibrationStats, CalibrationStatus,
    ConfusionMatrix, LufsCalibration, SharedProfile, DEFAULT_MULTIPLIERS,
};
use crate::raw::RawAnalyze;
use cadence_analysis::MusicalKey;
use cadence_library::KeyValueStore;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Ground truth entries required before a run is allowed
pub const MIN_GROUND_TRUTH: usize = 10;

/// Loudness pairs required before an offset is learned
pub const MIN_LUFS_ENTRIES: usize = 5;

/// Calibrated loudness within this many dB counts as accurate
pub const LUFS_ACCURACY_DB: f32 = 1.0;

/// Relative matches must beat exact matches by this factor
const RELATIVE_FIX_RATIO: f32 = 1.2;

/// One ground truth entry next to what the raw pipeline detected
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub true_bpm: f32,
    /// Ground truth key as written by the user
    pub true_key: String,
    pub true_lufs: Option<f32>,
    pub detected_bpm: Option<u32>,
    pub detected_key: Option<MusicalKey>,
    pub detected_lufs: Option<f32>,
    pub genre: String,
}

impl TestResult {
    fn parsed_true_key(&self) -> Option<MusicalKey> {
        MusicalKey::parse(&self.true_key)
    }

    fn bpm_matches(&self, multiplier: f32, tolerance: f32) -> bool {
        self.detected_bpm.map_or(false, |bpm| {
            ((bpm as f32 * multiplier) - self.true_bpm).abs() / self.true_bpm < tolerance
        })
    }

    fn lufs_pair(&self) -> Option<(f32, f32)> {
        Some((self.true_lufs?, self.detected_lufs?))
    }
}

/// Outcome of the key fit
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFit {
    pub exact: usize,
    /// Includes exact matches
    pub relative: usize,
    pub total: usize,
    pub relative_fix: bool,
    pub confusion: ConfusionMatrix,
}

/// Multiplier with the most matches; earlier candidates win ties, 1.0 if none match
pub fn fit_bpm_multiplier(results: &[TestResult], bpm: &BpmCalibration) -> f32 {
    let candidates: &[f32] = if bpm.tested_multipliers.is_empty() {
        &DEFAULT_MULTIPLIERS
    } else {
        &bpm.tested_multipliers
    };
    let tolerance = bpm.tolerance();

    let mut best = (1.0, 0);
    for &multiplier in candidates {
        let matches = results
            .iter()
            .filter(|r| r.bpm_matches(multiplier, tolerance))
            .count();
        if matches > best.1 {
            best = (multiplier, matches);
        }
    }
    best.0
}

pub fn fit_key(results: &[TestResult]) -> KeyFit {
    let mut exact = 0;
    let mut relative = 0;
    let mut confusion = ConfusionMatrix::new();

    for r in results {
        let truth = r.parsed_true_key();
        let truth_label = truth.map_or_else(|| r.true_key.clone(), |k| k.to_string());
        let detected_label = r.detected_key.map_or_else(|| "none".to_string(), |k| k.to_string());
        *confusion
            .entry(truth_label)
            .or_default()
            .entry(detected_label)
            .or_default() += 1;

        let (Some(truth), Some(detected)) = (truth, r.detected_key) else {
            continue;
        };
        if detected == truth {
            exact += 1;
            relative += 1;
        } else if detected.relative() == truth {
            relative += 1;
        }
    }

    let total = results.len();
    let (exact_rate, relative_rate) = if total == 0 {
        (0.0, 0.0)
    } else {
        (exact as f32 / total as f32, relative as f32 / total as f32)
    };

    KeyFit {
        exact,
        relative,
        total,
        relative_fix: relative_rate > exact_rate * RELATIVE_FIX_RATIO,
        confusion,
    }
}

/// Mean loudness error, rounded to 0.1 dB, when enough pairs exist
pub fn fit_lufs_offset(results: &[TestResult]) -> Option<f32> {
    let pairs: Vec<(f32, f32)> = results.iter().filter_map(TestResult::lufs_pair).collect();
    if pairs.len() < MIN_LUFS_ENTRIES {
        return None;
    }
    let mean = pairs.iter().map(|(t, d)| t - d).sum::<f32>() / pairs.len() as f32;
    Some((mean * 10.0).round() / 10.0)
}

/// Accuracy of `results` once the corrections in `profile` are applied
///
/// The relative key fix is applied whenever it was learned, even before the
/// profile is marked calibrated.
pub fn score(results: &[TestResult], profile: &CalibrationProfile) -> CalibrationStats {
    let fraction = |hits: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            hits as f32 / total as f32
        }
    };

    // Judge the tempo the analyzer would actually report, after rounding
    // and range fitting
    let tolerance = profile.bpm.tolerance();
    let bpm_hits = results
        .iter()
        .filter(|r| {
            r.detected_bpm
                .and_then(|bpm| profile.bpm.corrected(bpm))
                .map_or(false, |bpm| (bpm as f32 - r.true_bpm).abs() / r.true_bpm < tolerance)
        })
        .count();

    let key_hits = results
        .iter()
        .filter(|r| {
            let corrected = r.detected_key.map(|k| {
                if profile.key.relative_major_minor_fix {
                    k.relative()
                } else {
                    k
                }
            });
            matches!((corrected, r.parsed_true_key()), (Some(d), Some(t)) if d == t)
        })
        .count();

    let offset = if profile.lufs.calibrated {
        profile.lufs.offset_db
    } else {
        0.0
    };
    let pairs: Vec<(f32, f32)> = results.iter().filter_map(TestResult::lufs_pair).collect();
    let lufs_hits = pairs
        .iter()
        .filter(|(t, d)| (d + offset - t).abs() < LUFS_ACCURACY_DB)
        .count();

    CalibrationStats {
        tracks_used: results.len(),
        bpm_accuracy: fraction(bpm_hits, results.len()),
        key_accuracy: fraction(key_hits, results.len()),
        lufs_accuracy: fraction(lufs_hits, pairs.len()),
    }
}

/// Owns the ground truth and the only write path to the profile
pub struct Calibrator {
    store: Arc<dyn KeyValueStore>,
    profile: SharedProfile,
    ground_truth: Mutex<GroundTruth>,
    min_entries: usize,
    /// Held for the whole of a calibrate or reset
    run_lock: Mutex<()>,
}

impl Calibrator {
    pub fn new(store: Arc<dyn KeyValueStore>, profile: SharedProfile) -> Self {
        Self {
            store,
            profile,
            ground_truth: Mutex::new(GroundTruth::new()),
            min_entries: MIN_GROUND_TRUTH,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_min_entries(mut self, min_entries: usize) -> Self {
        self.min_entries = min_entries;
        self
    }

    pub fn min_entries(&self) -> usize {
        self.min_entries
    }

    /// Current profile snapshot
    pub fn profile(&self) -> Arc<CalibrationProfile> {
        self.profile.snapshot()
    }

    /// Handle for analyzers that read this calibrator's profile
    pub fn shared_profile(&self) -> SharedProfile {
        self.profile.clone()
    }

    pub fn status(&self) -> CalibrationStatus {
        self.profile.snapshot().status()
    }

    pub fn add_ground_truth(&self, entry: GroundTruthEntry) -> bool {
        self.ground_truth.lock().add(entry)
    }

    pub fn ground_truth(&self) -> GroundTruth {
        self.ground_truth.lock().clone()
    }

    pub fn ground_truth_len(&self) -> usize {
        self.ground_truth.lock().len()
    }

    pub fn export_ground_truth(&self) -> GroundTruthExport {
        self.ground_truth.lock().export()
    }

    pub fn import_ground_truth(&self, tracks: impl IntoIterator<Item = GroundTruthEntry>) -> usize {
        let imported = self.ground_truth.lock().import(tracks);
        info!(imported, "Imported ground truth");
        imported
    }

    /// Restore the default profile, persist it, and forget all ground truth
    pub fn reset(&self) -> Result<Arc<CalibrationProfile>, CalibrationError> {
        let _run = self.run_lock.lock();
        let saved = save_profile(self.store.as_ref(), CalibrationProfile::default())?;
        self.ground_truth.lock().clear();
        info!("Calibration reset");
        Ok(self.profile.replace(saved))
    }

    /// Run every ground truth entry through `raw` and learn a new profile
    ///
    /// Fails without touching the stored or published profile when there is
    /// too little ground truth, when no entry could be analyzed, or when the
    /// new profile could not be saved.
    pub fn calibrate(
        &self,
        raw: &dyn RawAnalyze,
    ) -> Result<Arc<CalibrationProfile>, CalibrationError> {
        let _run = self.run_lock.lock();

        let entries = self.ground_truth.lock().entries().to_vec();
        if entries.len() < self.min_entries {
            return Err(CalibrationError::InsufficientGroundTruth {
                required: self.min_entries,
                available: entries.len(),
            });
        }

        info!(tracks = entries.len(), "Calibration started");
        let results = collect_results(&entries, raw);
        if results.is_empty() {
            return Err(CalibrationError::NoUsableResults);
        }

        let profile = fit_profile(&self.profile.snapshot(), &results);
        let saved = save_profile(self.store.as_ref(), profile)?;

        info!(
            tracks = saved.stats.tracks_used,
            bpm_accuracy = saved.stats.bpm_accuracy,
            key_accuracy = saved.stats.key_accuracy,
            lufs_accuracy = saved.stats.lufs_accuracy,
            multiplier = saved.bpm.preferred_multiplier,
            relative_fix = saved.key.relative_major_minor_fix,
            lufs_offset = saved.lufs.offset_db,
            "Calibration complete"
        );
        Ok(self.profile.replace(saved))
    }
}

fn collect_results(entries: &[GroundTruthEntry], raw: &dyn RawAnalyze) -> Vec<TestResult> {
    entries
        .iter()
        .filter_map(|entry| match raw.analyze_raw(Path::new(&entry.file_path)) {
            Ok(analysis) => Some(TestResult {
                true_bpm: entry.true_bpm,
                true_key: entry.true_key.clone(),
                true_lufs: entry.true_lufs,
                detected_bpm: analysis.bpm,
                detected_key: analysis.key,
                detected_lufs: analysis.lufs,
                genre: entry.genre.clone(),
            }),
            Err(e) => {
                warn!(path = %entry.file_path, error = %e, "Skipping ground truth track");
                None
            }
        })
        .collect()
}

/// Fresh profile learned from `results`, keeping the tunables of `current`
fn fit_profile(current: &CalibrationProfile, results: &[TestResult]) -> CalibrationProfile {
    let mut profile = current.clone();

    profile.bpm.preferred_multiplier = fit_bpm_multiplier(results, &profile.bpm);

    let key_fit = fit_key(results);
    profile.key.relative_major_minor_fix = key_fit.relative_fix;
    profile.key.confusion_matrix = key_fit.confusion;

    profile.lufs = match fit_lufs_offset(results) {
        Some(offset_db) => LufsCalibration {
            offset_db,
            calibrated: true,
        },
        None => LufsCalibration::default(),
    };

    profile.stats = score(results, &profile);
    profile.calibrated = true;
    profile
}
