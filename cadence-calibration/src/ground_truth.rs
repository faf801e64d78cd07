//! Ground truth: tracks whose tempo, key and loudness are known

use crate::profile::{now_millis, PROFILE_VERSION};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A track with trusted reference values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "trueBPM", alias = "bpm")]
    pub true_bpm: f32,
    #[serde(rename = "trueKey", alias = "key")]
    pub true_key: String,
    #[serde(rename = "trueLUFS", alias = "lufs", default)]
    pub true_lufs: Option<f32>,
    #[serde(default = "unknown_genre")]
    pub genre: String,
    #[serde(default)]
    pub timestamp: u64,
}

fn unknown_genre() -> String {
    "unknown".to_string()
}

impl GroundTruthEntry {
    pub fn new(file_path: impl Into<String>, true_bpm: f32, true_key: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            true_bpm,
            true_key: true_key.into(),
            true_lufs: None,
            genre: unknown_genre(),
            timestamp: now_millis(),
        }
    }

    pub fn with_lufs(mut self, lufs: f32) -> Self {
        self.true_lufs = Some(lufs);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    /// Entries need a path, a positive tempo and a key
    pub fn is_valid(&self) -> bool {
        !self.file_path.trim().is_empty()
            && self.true_bpm.is_finite()
            && self.true_bpm > 0.0
            && !self.true_key.trim().is_empty()
    }
}

/// Exchange document for ground truth sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthExport {
    #[serde(default)]
    pub version: String,
    /// Unix milliseconds at export
    #[serde(default)]
    pub exported: u64,
    pub tracks: Vec<GroundTruthEntry>,
}

/// Ordered, append-only ground truth collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    entries: Vec<GroundTruthEntry>,
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, rejecting it when required fields are missing
    pub fn add(&mut self, mut entry: GroundTruthEntry) -> bool {
        if !entry.is_valid() {
            warn!(path = %entry.file_path, "Ground truth entry missing path, tempo or key");
            return false;
        }
        if entry.genre.trim().is_empty() {
            entry.genre = unknown_genre();
        }
        if entry.timestamp == 0 {
            entry.timestamp = now_millis();
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[GroundTruthEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn export(&self) -> GroundTruthExport {
        GroundTruthExport {
            version: PROFILE_VERSION.to_string(),
            exported: now_millis(),
            tracks: self.entries.clone(),
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export())
    }

    /// Append every valid track, returning how many were accepted
    pub fn import(&mut self, tracks: impl IntoIterator<Item = GroundTruthEntry>) -> usize {
        tracks.into_iter().filter(|t| self.add(t.clone())).count()
    }

    /// Accepts an export document or a bare array of tracks
    pub fn import_json(&mut self, json: &str) -> Result<usize, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Document {
            Export(GroundTruthExport),
            Tracks(Vec<GroundTruthEntry>),
        }

        let tracks = match serde_json::from_str(json)? {
            Document::Export(export) => export.tracks,
            Document::Tracks(tracks) => tracks,
        };
        Ok(self.import(tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_validates() {
        let mut gt = GroundTruth::new();
        assert!(gt.add(GroundTruthEntry::new("a.mp3", 128.0, "Am")));
        assert!(!gt.add(GroundTruthEntry::new("", 128.0, "Am")));
        assert!(!gt.add(GroundTruthEntry::new("b.mp3", 0.0, "Am")));
        assert!(!gt.add(GroundTruthEntry::new("c.mp3", f32::NAN, "Am")));
        assert!(!gt.add(GroundTruthEntry::new("d.mp3", 120.0, " ")));
        assert_eq!(gt.len(), 1);
        assert_eq!(gt.entries()[0].genre, "unknown");
    }

    #[test]
    fn test_entry_field_names() {
        let entry = GroundTruthEntry::new("a.mp3", 128.0, "Am").with_lufs(-9.0);
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["filePath"], "a.mp3");
        assert_eq!(json["trueBPM"], 128.0);
        assert_eq!(json["trueKey"], "Am");
        assert_eq!(json["trueLUFS"], -9.0);
        assert_eq!(json["genre"], "unknown");
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut gt = GroundTruth::new();
        gt.add(GroundTruthEntry::new("a.mp3", 128.0, "Am").with_genre("house"));
        gt.add(GroundTruthEntry::new("b.flac", 174.0, "F#m").with_lufs(-7.5));

        let json = gt.export_json().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["version"], "1.1");
        assert_eq!(doc["tracks"].as_array().unwrap().len(), 2);

        let mut restored = GroundTruth::new();
        assert_eq!(restored.import_json(&json).unwrap(), 2);
        assert_eq!(restored, gt);
    }

    #[test]
    fn test_import_short_field_names() {
        let json = r#"[
            {"filePath": "a.mp3", "bpm": 120, "key": "C", "lufs": -8.0},
            {"filePath": "b.mp3", "bpm": 0, "key": "C"}
        ]"#;
        let mut gt = GroundTruth::new();
        assert_eq!(gt.import_json(json).unwrap(), 1);
        assert_eq!(gt.entries()[0].true_lufs, Some(-8.0));
        assert!(gt.entries()[0].timestamp > 0);
    }

    #[test]
    fn test_import_rejects_malformed_json() {
        assert!(GroundTruth::new().import_json("{\"tracks\": 5}").is_err());
    }
}
