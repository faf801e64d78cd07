//! End-to-end calibration runs against a scripted raw analyzer

use cadence_analysis::MusicalKey;
use cadence_calibration::{
    CalibratedAnalyzer, CalibrationError, CalibrationProfile, Calibrator, GroundTruthEntry,
    RawAnalysis, RawAnalyze, SharedProfile, PROFILE_KEY,
};
use cadence_library::{DecodeError, KeyValueStore, MemoryStore, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raw analyzer answering from a fixed table; unknown paths fail to decode
#[derive(Default)]
struct Scripted {
    answers: HashMap<PathBuf, RawAnalysis>,
}

impl Scripted {
    fn answer(&mut self, path: &str, bpm: Option<u32>, key: Option<&str>, lufs: Option<f32>) {
        self.answers.insert(
            PathBuf::from(path),
            RawAnalysis {
                bpm,
                bpm_confidence: 0.9,
                key: key.and_then(MusicalKey::parse),
                key_confidence: 0.8,
                lufs,
                ..RawAnalysis::default()
            },
        );
    }
}

impl RawAnalyze for Scripted {
    fn analyze_raw(&self, path: &Path) -> Result<RawAnalysis, DecodeError> {
        self.answers
            .get(path)
            .cloned()
            .ok_or(DecodeError::UnsupportedFormat)
    }
}

/// Store that reads fine but refuses every write
struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read only",
        )))
    }
}

fn calibrator(store: Arc<dyn KeyValueStore>) -> Calibrator {
    let profile = SharedProfile::load(store.as_ref());
    Calibrator::new(store, profile)
}

/// Twelve 128 BPM tracks the detector hears at half time
fn half_time_fixture(calibrator: &Calibrator) -> Scripted {
    let mut raw = Scripted::default();
    for i in 0..12 {
        let path = format!("house/{}.mp3", i);
        calibrator.add_ground_truth(GroundTruthEntry::new(path.clone(), 128.0, "Am"));
        raw.answer(&path, Some(64), Some("Am"), Some(-10.0));
    }
    raw
}

#[test]
fn half_time_detection_learns_double_multiplier() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store.clone());
    let raw = half_time_fixture(&calibrator);

    let profile = calibrator.calibrate(&raw).unwrap();
    assert!(profile.calibrated);
    assert_eq!(profile.bpm.preferred_multiplier, 2.0);
    assert_eq!(profile.stats.bpm_accuracy, 1.0);
    assert_eq!(profile.stats.key_accuracy, 1.0);
    assert_eq!(profile.stats.tracks_used, 12);
    assert!(!profile.key.relative_major_minor_fix);
    assert!(profile.last_updated.is_some());

    let status = calibrator.status();
    assert!(status.calibrated);
    assert_eq!(status.bpm_multiplier, 2.0);
}

#[test]
fn relative_minor_detection_enables_key_fix() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store);
    let mut raw = Scripted::default();

    let majors = ["C", "G", "D", "A", "E", "F"];
    for (i, key) in majors.iter().enumerate() {
        let path = format!("ok/{}.flac", i);
        calibrator.add_ground_truth(GroundTruthEntry::new(path.clone(), 124.0, *key));
        let relative = MusicalKey::parse(key).unwrap().relative().to_string();
        raw.answer(&path, Some(124), Some(&relative), None);
    }
    // four more entries the decoder cannot read
    for i in 0..4 {
        calibrator.add_ground_truth(GroundTruthEntry::new(format!("broken/{}.m4a", i), 124.0, "C"));
    }

    let profile = calibrator.calibrate(&raw).unwrap();
    assert!(profile.key.relative_major_minor_fix);
    assert_eq!(profile.stats.tracks_used, 6);
    assert_eq!(profile.stats.key_accuracy, 1.0);
    assert_eq!(profile.key.confusion_matrix["C"]["Am"], 1);
    assert!(!profile.lufs.calibrated);
}

#[test]
fn too_little_ground_truth_leaves_store_untouched() {
    let store = Arc::new(MemoryStore::new());
    let stored = r#"{"version":"1.1","calibrated":true,"bpm":{"preferredMultiplier":0.5}}"#;
    store.set(PROFILE_KEY, stored).unwrap();

    let calibrator = calibrator(store.clone());
    let mut raw = Scripted::default();
    for i in 0..9 {
        let path = format!("{}.wav", i);
        calibrator.add_ground_truth(GroundTruthEntry::new(path.clone(), 100.0, "Em"));
        raw.answer(&path, Some(100), Some("Em"), None);
    }

    let err = calibrator.calibrate(&raw).unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::InsufficientGroundTruth {
            required: 10,
            available: 9
        }
    ));
    assert_eq!(store.get(PROFILE_KEY).unwrap().as_deref(), Some(stored));
    assert_eq!(calibrator.profile().bpm.preferred_multiplier, 0.5);
}

#[test]
fn every_entry_failing_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store.clone());
    for i in 0..10 {
        calibrator.add_ground_truth(GroundTruthEntry::new(format!("{}.ogg", i), 90.0, "D"));
    }

    let err = calibrator.calibrate(&Scripted::default()).unwrap_err();
    assert!(matches!(err, CalibrationError::NoUsableResults));
    assert_eq!(store.get(PROFILE_KEY).unwrap(), None);
    assert!(!calibrator.profile().calibrated);
}

#[test]
fn failed_save_keeps_previous_profile() {
    let calibrator = calibrator(Arc::new(ReadOnlyStore));
    let raw = half_time_fixture(&calibrator);

    let err = calibrator.calibrate(&raw).unwrap_err();
    assert!(matches!(err, CalibrationError::Store(_)));
    assert_eq!(*calibrator.profile(), CalibrationProfile::default());
}

#[test]
fn calibration_is_deterministic() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store);
    let raw = half_time_fixture(&calibrator);

    let first = calibrator.calibrate(&raw).unwrap();
    let second = calibrator.calibrate(&raw).unwrap();
    assert_eq!(first.bpm.preferred_multiplier, second.bpm.preferred_multiplier);
    assert_eq!(first.stats, second.stats);
    assert_eq!(first.key, second.key);
}

#[test]
fn loudness_offset_is_learned() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store);
    let mut raw = Scripted::default();
    for i in 0..10 {
        let path = format!("{}.mp3", i);
        let mut entry = GroundTruthEntry::new(path.clone(), 120.0, "G");
        if i < 6 {
            entry = entry.with_lufs(-8.0);
        }
        calibrator.add_ground_truth(entry);
        raw.answer(&path, Some(120), Some("G"), Some(-11.0));
    }

    let profile = calibrator.calibrate(&raw).unwrap();
    assert!(profile.lufs.calibrated);
    assert_eq!(profile.lufs.offset_db, 3.0);
    assert_eq!(profile.stats.lufs_accuracy, 1.0);
    assert_eq!(profile.bpm.preferred_multiplier, 1.0);
}

#[test]
fn profile_survives_reload() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store.clone());
    let raw = half_time_fixture(&calibrator);
    let learned = calibrator.calibrate(&raw).unwrap();

    let reloaded = SharedProfile::load(store.as_ref()).snapshot();
    assert_eq!(*reloaded, *learned);
}

#[test]
fn analyzer_sees_new_profile_after_calibration() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store);
    let raw = Arc::new(half_time_fixture(&calibrator));
    let analyzer = CalibratedAnalyzer::new(raw.clone(), calibrator.shared_profile());

    let path = Path::new("house/0.mp3");
    assert_eq!(analyzer.analyze(path).bpm, Some(64));

    calibrator.calibrate(raw.as_ref()).unwrap();
    let result = analyzer.analyze(path);
    assert_eq!(result.bpm, Some(128));
    assert_eq!(result.bpm_label, "high");
}

#[test]
fn scored_accuracy_matches_reported_tempo_near_lower_bound() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store);
    let mut raw = Scripted::default();
    for i in 0..12 {
        let path = format!("ballad/{}.wav", i);
        calibrator.add_ground_truth(GroundTruthEntry::new(path.clone(), 60.0, "Dm"));
        raw.answer(&path, Some(90), Some("Dm"), None);
    }
    let raw = Arc::new(raw);

    let profile = calibrator.calibrate(raw.as_ref()).unwrap();
    assert_eq!(profile.bpm.preferred_multiplier, 0.66);
    assert_eq!(profile.stats.bpm_accuracy, 1.0);

    let analyzer = CalibratedAnalyzer::new(raw, calibrator.shared_profile());
    assert_eq!(analyzer.analyze(Path::new("ballad/0.wav")).bpm, Some(60));
}

#[test]
fn reset_restores_defaults() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = calibrator(store.clone());
    let raw = half_time_fixture(&calibrator);
    calibrator.calibrate(&raw).unwrap();

    let profile = calibrator.reset().unwrap();
    assert!(!profile.calibrated);
    assert_eq!(profile.bpm.preferred_multiplier, 1.0);
    assert_eq!(calibrator.ground_truth_len(), 0);

    let stored = store.get(PROFILE_KEY).unwrap().unwrap();
    assert!(!CalibrationProfile::from_json(&stored).unwrap().calibrated);
}

#[test]
fn ground_truth_export_import_roundtrip() {
    let source = calibrator(Arc::new(MemoryStore::new()));
    source.add_ground_truth(GroundTruthEntry::new("a.mp3", 128.0, "Am").with_lufs(-9.0));
    source.add_ground_truth(GroundTruthEntry::new("b.mp3", 174.0, "F#m"));
    source.add_ground_truth(GroundTruthEntry::new("c.mp3", 95.5, "Eb").with_genre("hip-hop"));

    let json = serde_json::to_string(&source.export_ground_truth()).unwrap();
    let restored = calibrator(Arc::new(MemoryStore::new()));
    let mut imported = cadence_calibration::GroundTruth::new();
    imported.import_json(&json).unwrap();
    assert_eq!(restored.import_ground_truth(imported.entries().to_vec()), 3);

    let tuples = |c: &Calibrator| -> Vec<(String, f32, String)> {
        c.ground_truth()
            .entries()
            .iter()
            .map(|e| (e.file_path.clone(), e.true_bpm, e.true_key.clone()))
            .collect()
    };
    assert_eq!(tuples(&source), tuples(&restored));
}

#[test]
fn concurrent_calibrations_are_serialized() {
    let store = Arc::new(MemoryStore::new());
    let calibrator = Arc::new(calibrator(store.clone()));
    let raw = Arc::new(half_time_fixture(&calibrator));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let calibrator = Arc::clone(&calibrator);
            let raw = Arc::clone(&raw);
            std::thread::spawn(move || calibrator.calibrate(raw.as_ref()).map(|p| p.stats.clone()))
        })
        .collect();
    for handle in handles {
        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.tracks_used, 12);
    }

    let stored = store.get(PROFILE_KEY).unwrap().unwrap();
    assert_eq!(
        CalibrationProfile::from_json(&stored).unwrap(),
        *calibrator.profile()
    );
}
