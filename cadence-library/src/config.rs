//! Simple configuration persistence for Cadence
//!
//! Stores analyzer settings as `key=value` lines.

use crate::decoder::DEFAULT_SAMPLE_RATE;
use cadence_analysis::DEFAULT_ONSET_THRESHOLD;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Sample rate every file is decoded to
    pub sample_rate: u32,
    /// Relative onset threshold above the mean envelope energy
    pub onset_threshold: f32,
    /// How long a single decode may take before it is cancelled
    pub decode_timeout_secs: u64,
    /// Ground truth entries required before calibrating
    pub min_ground_truth: usize,
    /// SQLite database holding the calibration profile
    pub store_path: PathBuf,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            onset_threshold: DEFAULT_ONSET_THRESHOLD,
            decode_timeout_secs: 120,
            min_ground_truth: 10,
            store_path: Self::default_store_path(),
        }
    }
}

impl AnalyzerConfig {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
            .join("config.txt")
    }

    /// Get the default store database path
    pub fn default_store_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
            .join("cadence.db")
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "sample_rate" => match value.parse::<u32>() {
                    Ok(v) if v > 0 => config.sample_rate = v,
                    _ => warn!(key, value, "Ignoring invalid config value"),
                },
                "onset_threshold" => match value.parse::<f32>() {
                    Ok(v) if v.is_finite() && v >= 0.0 => config.onset_threshold = v,
                    _ => warn!(key, value, "Ignoring invalid config value"),
                },
                "decode_timeout_secs" => match value.parse::<u64>() {
                    Ok(v) if v > 0 => config.decode_timeout_secs = v,
                    _ => warn!(key, value, "Ignoring invalid config value"),
                },
                "min_ground_truth" => match value.parse::<usize>() {
                    Ok(v) if v > 0 => config.min_ground_truth = v,
                    _ => warn!(key, value, "Ignoring invalid config value"),
                },
                "store_path" => {
                    if !value.is_empty() {
                        config.store_path = PathBuf::from(value);
                    }
                }
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        [
            "# Cadence Configuration".to_string(),
            format!("sample_rate={}", self.sample_rate),
            format!("onset_threshold={}", self.onset_threshold),
            format!("decode_timeout_secs={}", self.decode_timeout_secs),
            format!("min_ground_truth={}", self.min_ground_truth),
            format!("store_path={}", self.store_path.display()),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(AnalyzerConfig::parse(""), AnalyzerConfig::default());
    }

    #[test]
    fn test_parse_values() {
        let config = AnalyzerConfig::parse(
            "sample_rate=44100\nonset_threshold=0.5\ndecode_timeout_secs=30\nmin_ground_truth=20\nstore_path=/tmp/c.db",
        );
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.onset_threshold, 0.5);
        assert_eq!(config.decode_timeout(), Duration::from_secs(30));
        assert_eq!(config.min_ground_truth, 20);
        assert_eq!(config.store_path, PathBuf::from("/tmp/c.db"));
    }

    #[test]
    fn test_parse_with_comments_and_unknown_keys() {
        let config = AnalyzerConfig::parse("# Comment\nsample_rate=48000\ncolor=blue\n# Another");
        assert_eq!(config.sample_rate, 48000);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config =
            AnalyzerConfig::parse("sample_rate=0\nonset_threshold=abc\nmin_ground_truth=-3");
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.onset_threshold, DEFAULT_ONSET_THRESHOLD);
        assert_eq!(config.min_ground_truth, 10);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = AnalyzerConfig {
            sample_rate: 32000,
            onset_threshold: 0.25,
            decode_timeout_secs: 45,
            min_ground_truth: 12,
            store_path: PathBuf::from("/test/path.db"),
        };
        assert_eq!(AnalyzerConfig::parse(&config.serialize()), config);
    }

    #[test]
    fn test_save_to_creates_parent_and_loads_back() {
        let dir = std::env::temp_dir().join(format!("cadence-config-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("config.txt");

        let config = AnalyzerConfig {
            onset_threshold: 0.4,
            min_ground_truth: 15,
            ..AnalyzerConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AnalyzerConfig::load_from(&path).unwrap(), config);

        let _ = fs::remove_dir_all(&dir);
    }
}
