//! Learned correction profile and its persistence
//!
//! The profile is stored as one JSON document under [`PROFILE_KEY`]. Loading
//! merges the stored document over the defaults field by field, so documents
//! written before a field existed still load.

use crate::error::CalibrationError;
use cadence_analysis::{fold_octave, MusicalKey, MAX_BPM, MIN_BPM};
use cadence_library::KeyValueStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Store key of the persisted profile
pub const PROFILE_KEY: &str = "analyzer_calibration";

/// Schema version written into every document
pub const PROFILE_VERSION: &str = "1.1";

/// Tempo multipliers tried during calibration, in tie-break order
pub const DEFAULT_MULTIPLIERS: [f32; 7] = [0.5, 0.66, 0.75, 1.0, 1.33, 1.5, 2.0];

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BpmCalibration {
    pub preferred_multiplier: f32,
    pub tested_multipliers: Vec<f32>,
    /// Match tolerance in percent of the true tempo
    pub deviation_percent: f32,
    /// Whether alternative tempo candidates are scaled too
    pub candidates: bool,
}

impl Default for BpmCalibration {
    fn default() -> Self {
        Self {
            preferred_multiplier: 1.0,
            tested_multipliers: DEFAULT_MULTIPLIERS.to_vec(),
            deviation_percent: 3.0,
            candidates: true,
        }
    }
}

impl BpmCalibration {
    pub fn tolerance(&self) -> f32 {
        self.deviation_percent / 100.0
    }

    /// Tempo reported for `raw_bpm` once the preferred multiplier is applied
    pub fn corrected(&self, raw_bpm: u32) -> Option<u32> {
        self.fit_to_range(scale_bpm(raw_bpm, self.preferred_multiplier))
    }

    /// Bring a scaled tempo back into the plausible range
    ///
    /// Within tolerance of a bound the value clamps to that bound; further
    /// out it is octave-folded.
    pub fn fit_to_range(&self, bpm: u32) -> Option<u32> {
        let value = bpm as f32;
        let tolerance = self.tolerance();
        if value < MIN_BPM && value >= MIN_BPM * (1.0 - tolerance) {
            return Some(MIN_BPM as u32);
        }
        if value > MAX_BPM && value <= MAX_BPM * (1.0 + tolerance) {
            return Some(MAX_BPM as u32);
        }
        fold_octave(value).map(|b| b.round() as u32)
    }
}

fn scale_bpm(bpm: u32, multiplier: f32) -> u32 {
    (bpm as f32 * multiplier).round() as u32
}

/// true key -> detected key -> count
pub type ConfusionMatrix = BTreeMap<String, BTreeMap<String, u32>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyCalibration {
    pub relative_major_minor_fix: bool,
    pub circle_of_fifths_tolerance: u32,
    pub confusion_matrix: ConfusionMatrix,
}

impl Default for KeyCalibration {
    fn default() -> Self {
        Self {
            relative_major_minor_fix: false,
            circle_of_fifths_tolerance: 1,
            confusion_matrix: ConfusionMatrix::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LufsCalibration {
    pub offset_db: f32,
    pub calibrated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibrationStats {
    pub tracks_used: usize,
    pub bpm_accuracy: f32,
    pub key_accuracy: f32,
    pub lufs_accuracy: f32,
}

/// Correction parameters learned from ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub version: String,
    pub calibrated: bool,
    /// Unix milliseconds of the last save
    pub last_updated: Option<u64>,
    pub bpm: BpmCalibration,
    pub key: KeyCalibration,
    pub lufs: LufsCalibration,
    pub stats: CalibrationStats,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            version: PROFILE_VERSION.to_string(),
            calibrated: false,
            last_updated: None,
            bpm: BpmCalibration::default(),
            key: KeyCalibration::default(),
            lufs: LufsCalibration::default(),
            stats: CalibrationStats::default(),
        }
    }
}

/// Tempo after calibration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibratedBpm {
    pub bpm: u32,
    /// "high" when a learned multiplier was applied, "medium" otherwise
    pub confidence: &'static str,
    pub multiplier: f32,
    pub candidates: Vec<u32>,
}

/// Read-only summary of a profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationStatus {
    pub calibrated: bool,
    pub tracks_used: usize,
    pub bpm_accuracy: f32,
    pub key_accuracy: f32,
    pub lufs_accuracy: f32,
    pub bpm_multiplier: f32,
    pub lufs_offset: f32,
    pub relative_fix: bool,
    pub last_updated: Option<u64>,
}

impl CalibrationProfile {
    /// Parse a stored document, filling missing fields from defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Scale a raw tempo (and its alternatives) by the learned multiplier
    pub fn apply_bpm(&self, raw_bpm: u32, candidates: &[u32]) -> CalibratedBpm {
        if !self.calibrated {
            return CalibratedBpm {
                bpm: raw_bpm,
                confidence: "medium",
                multiplier: 1.0,
                candidates: candidates.to_vec(),
            };
        }

        let multiplier = self.bpm.preferred_multiplier;
        let scale = |bpm: u32| scale_bpm(bpm, multiplier);
        CalibratedBpm {
            bpm: scale(raw_bpm),
            confidence: "high",
            multiplier,
            candidates: if self.bpm.candidates {
                candidates.iter().copied().map(scale).collect()
            } else {
                candidates.to_vec()
            },
        }
    }

    /// Swap in the relative major/minor when the profile learned to
    pub fn apply_key(&self, raw_key: MusicalKey) -> MusicalKey {
        if self.calibrated && self.key.relative_major_minor_fix {
            raw_key.relative()
        } else {
            raw_key
        }
    }

    /// Add the learned loudness offset when loudness was calibrated
    pub fn apply_lufs(&self, raw_lufs: f32) -> f32 {
        if self.calibrated && self.lufs.calibrated {
            raw_lufs + self.lufs.offset_db
        } else {
            raw_lufs
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        CalibrationStatus {
            calibrated: self.calibrated,
            tracks_used: self.stats.tracks_used,
            bpm_accuracy: self.stats.bpm_accuracy,
            key_accuracy: self.stats.key_accuracy,
            lufs_accuracy: self.stats.lufs_accuracy,
            bpm_multiplier: self.bpm.preferred_multiplier,
            lufs_offset: self.lufs.offset_db,
            relative_fix: self.key.relative_major_minor_fix,
            last_updated: self.last_updated,
        }
    }
}

/// Load the profile from the store
///
/// A missing or unparsable document yields the default profile.
pub fn load_profile(store: &dyn KeyValueStore) -> CalibrationProfile {
    match store.get(PROFILE_KEY) {
        Ok(Some(json)) => match CalibrationProfile::from_json(&json) {
            Ok(profile) => {
                info!(calibrated = profile.calibrated, "Loaded calibration profile");
                profile
            }
            Err(e) => {
                warn!(error = %e, "Stored calibration profile is corrupt, using defaults");
                CalibrationProfile::default()
            }
        },
        Ok(None) => {
            debug!("No calibration profile stored, using defaults");
            CalibrationProfile::default()
        }
        Err(e) => {
            warn!(error = %e, "Could not read calibration profile, using defaults");
            CalibrationProfile::default()
        }
    }
}

/// Stamp `last_updated` and write the profile to the store
pub fn save_profile(
    store: &dyn KeyValueStore,
    mut profile: CalibrationProfile,
) -> Result<CalibrationProfile, CalibrationError> {
    profile.last_updated = Some(now_millis());
    store.set(PROFILE_KEY, &profile.to_json()?)?;
    info!("Calibration profile saved");
    Ok(profile)
}

/// Shared, atomically replaced profile snapshot
///
/// Readers clone the inner `Arc` and never see a half-written profile.
#[derive(Debug, Clone, Default)]
pub struct SharedProfile {
    current: Arc<RwLock<Arc<CalibrationProfile>>>,
}

impl SharedProfile {
    pub fn new(profile: CalibrationProfile) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(profile))),
        }
    }

    /// Load from the store once
    pub fn load(store: &dyn KeyValueStore) -> Self {
        Self::new(load_profile(store))
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<CalibrationProfile> {
        Arc::clone(&self.current.read())
    }

    pub(crate) fn replace(&self, profile: CalibrationProfile) -> Arc<CalibrationProfile> {
        let profile = Arc::new(profile);
        *self.current.write() = Arc::clone(&profile);
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_library::MemoryStore;

    fn calibrated() -> CalibrationProfile {
        let mut profile = CalibrationProfile::default();
        profile.calibrated = true;
        profile.bpm.preferred_multiplier = 2.0;
        profile.key.relative_major_minor_fix = true;
        profile.lufs = LufsCalibration {
            offset_db: -1.5,
            calibrated: true,
        };
        profile
    }

    #[test]
    fn test_default_document_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&CalibrationProfile::default().to_json().unwrap()).unwrap();
        assert_eq!(json["version"], "1.1");
        assert_eq!(json["calibrated"], false);
        assert_eq!(json["bpm"]["preferredMultiplier"], 1.0);
        assert_eq!(json["bpm"]["testedMultipliers"].as_array().unwrap().len(), 7);
        assert_eq!(json["key"]["relativeMajorMinorFix"], false);
        assert_eq!(json["lufs"]["offsetDb"], 0.0);
        assert_eq!(json["stats"]["tracksUsed"], 0);
    }

    #[test]
    fn test_old_document_fills_missing_fields() {
        let old = r#"{"version":"1.0","calibrated":true,"bpm":{"preferredMultiplier":2.0},"stats":{"tracksUsed":12}}"#;
        let profile = CalibrationProfile::from_json(old).unwrap();
        assert!(profile.calibrated);
        assert_eq!(profile.bpm.preferred_multiplier, 2.0);
        assert_eq!(profile.bpm.tested_multipliers, DEFAULT_MULTIPLIERS.to_vec());
        assert_eq!(profile.bpm.deviation_percent, 3.0);
        assert_eq!(profile.key, KeyCalibration::default());
        assert_eq!(profile.lufs, LufsCalibration::default());
        assert_eq!(profile.stats.tracks_used, 12);
    }

    #[test]
    fn test_corrupt_document_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(PROFILE_KEY, "{not json").unwrap();
        assert_eq!(load_profile(&store), CalibrationProfile::default());
    }

    #[test]
    fn test_missing_document_gives_defaults() {
        assert_eq!(load_profile(&MemoryStore::new()), CalibrationProfile::default());
    }

    #[test]
    fn test_save_stamps_and_loads_back() {
        let store = MemoryStore::new();
        let saved = save_profile(&store, calibrated()).unwrap();
        assert!(saved.last_updated.is_some());
        assert_eq!(load_profile(&store), saved);
    }

    #[test]
    fn test_apply_uncalibrated_is_passthrough() {
        let profile = CalibrationProfile::default();
        let bpm = profile.apply_bpm(64, &[96]);
        assert_eq!(bpm.bpm, 64);
        assert_eq!(bpm.confidence, "medium");
        assert_eq!(bpm.candidates, vec![96]);

        let key = MusicalKey::parse("Am").unwrap();
        assert_eq!(profile.apply_key(key), key);
        assert_eq!(profile.apply_lufs(-10.0), -10.0);
    }

    #[test]
    fn test_apply_calibrated() {
        let profile = calibrated();
        let bpm = profile.apply_bpm(64, &[48, 85]);
        assert_eq!(bpm.bpm, 128);
        assert_eq!(bpm.confidence, "high");
        assert_eq!(bpm.candidates, vec![96, 170]);

        let key = MusicalKey::parse("Am").unwrap();
        assert_eq!(profile.apply_key(key), MusicalKey::parse("C").unwrap());
        assert_eq!(profile.apply_lufs(-10.0), -11.5);
    }

    #[test]
    fn test_fit_to_range() {
        let bpm = BpmCalibration::default();
        assert_eq!(bpm.fit_to_range(128), Some(128));
        assert_eq!(bpm.fit_to_range(59), Some(60));
        assert_eq!(bpm.fit_to_range(225), Some(220));
        // Beyond tolerance the value is octave-folded
        assert_eq!(bpm.fit_to_range(55), Some(110));
        assert_eq!(bpm.fit_to_range(240), Some(120));
        assert_eq!(bpm.fit_to_range(0), None);
    }

    #[test]
    fn test_status_projection() {
        let status = calibrated().status();
        assert!(status.calibrated);
        assert_eq!(status.bpm_multiplier, 2.0);
        assert_eq!(status.lufs_offset, -1.5);
        assert!(status.relative_fix);
    }

    #[test]
    fn test_shared_profile_swap() {
        let shared = SharedProfile::default();
        let before = shared.snapshot();
        shared.replace(calibrated());
        assert!(!before.calibrated);
        assert!(shared.snapshot().calibrated);
    }
}
