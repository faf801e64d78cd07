//! Audio file discovery
//!
//! Expands a mix of files and directories into the list of audio files to
//! analyze.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration for file discovery
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (case-insensitive)
    pub extensions: Vec<String>,
    /// Whether to descend into subdirectories
    pub recursive: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec![
                "mp3".into(),
                "flac".into(),
                "wav".into(),
                "ogg".into(),
                "m4a".into(),
                "aac".into(),
            ],
            recursive: true,
        }
    }
}

impl ScanConfig {
    pub fn is_audio_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| {
                self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            })
    }
}

/// All audio files below `dir`, sorted by path
pub fn collect_audio_files(dir: &Path, config: &ScanConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read directory");
            return files;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_file() {
            if config.is_audio_file(&path) {
                files.push(path);
            }
        } else if path.is_dir() && config.recursive {
            files.extend(collect_audio_files(&path, config));
        }
    }

    files.sort();
    files
}

/// Expand directories into their audio files; plain files pass through as given
pub fn expand_paths(paths: &[PathBuf], config: &ScanConfig) -> Vec<PathBuf> {
    paths
        .iter()
        .flat_map(|path| {
            if path.is_dir() {
                collect_audio_files(path, config)
            } else {
                vec![path.clone()]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("cadence-scan-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("nested")).unwrap();
        for file in ["b.mp3", "a.FLAC", "notes.txt", "nested/c.wav"] {
            fs::write(dir.join(file), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_collect_recursive_sorted() {
        let dir = scratch_dir("recursive");
        let files = collect_audio_files(&dir, &ScanConfig::default());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(&dir).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.FLAC", "b.mp3", "nested/c.wav"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_collect_flat() {
        let dir = scratch_dir("flat");
        let config = ScanConfig {
            recursive: false,
            ..ScanConfig::default()
        };
        assert_eq!(collect_audio_files(&dir, &config).len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_expand_keeps_plain_files() {
        let dir = scratch_dir("expand");
        let explicit = PathBuf::from("/does/not/exist.mp3");
        let files = expand_paths(&[explicit.clone(), dir.clone()], &ScanConfig::default());
        assert_eq!(files.len(), 4);
        assert_eq!(files[0], explicit);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let files = collect_audio_files(Path::new("/does/not/exist"), &ScanConfig::default());
        assert!(files.is_empty());
    }
}
