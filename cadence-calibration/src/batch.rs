//! Parallel analysis of many files

use crate::analyzer::{AnalysisResult, CalibratedAnalyzer};
use crossbeam_channel::{unbounded, Sender};
use std::path::PathBuf;
use std::thread;
use tracing::info;

/// Progress updates during a batch
#[derive(Debug, Clone)]
pub enum BatchProgress {
    /// Batch started
    Started { total: usize },
    /// A file finished (1-indexed completion count)
    Analyzed {
        current: usize,
        total: usize,
        path: PathBuf,
        error: Option<String>,
    },
    /// Batch finished
    Complete { analyzed: usize, failed: usize },
}

/// Result of one file in a batch
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub path: PathBuf,
    pub result: AnalysisResult,
}

/// Runs a [`CalibratedAnalyzer`] over many files on a fixed pool of threads
pub struct BatchAnalyzer {
    analyzer: CalibratedAnalyzer,
    max_threads: usize,
}

impl BatchAnalyzer {
    pub fn new(analyzer: CalibratedAnalyzer) -> Self {
        let max_threads = thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            analyzer,
            max_threads,
        }
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Analyze every file, returning results in input order
    pub fn analyze_all(
        &self,
        files: Vec<PathBuf>,
        progress_tx: Option<Sender<BatchProgress>>,
    ) -> Vec<BatchItem> {
        let total = files.len();
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(BatchProgress::Started { total });
        }

        let (work_tx, work_rx) = unbounded();
        for job in files.into_iter().enumerate() {
            let _ = work_tx.send(job);
        }
        drop(work_tx);

        let (done_tx, done_rx) = unbounded();
        let thread_count = self.max_threads.min(total).max(1);

        thread::scope(|scope| {
            for _ in 0..thread_count {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (idx, path) in work_rx.iter() {
                        let result = self.analyzer.analyze(&path);
                        let _ = done_tx.send((idx, BatchItem { path, result }));
                    }
                });
            }
            drop(done_tx);

            let mut slots: Vec<Option<BatchItem>> = vec![None; total];
            let mut failed = 0;
            for (current, (idx, item)) in done_rx.iter().enumerate() {
                if item.result.is_error() {
                    failed += 1;
                }
                if let Some(ref tx) = progress_tx {
                    let _ = tx.send(BatchProgress::Analyzed {
                        current: current + 1,
                        total,
                        path: item.path.clone(),
                        error: item.result.error.clone(),
                    });
                }
                slots[idx] = Some(item);
            }

            if let Some(ref tx) = progress_tx {
                let _ = tx.send(BatchProgress::Complete {
                    analyzed: total - failed,
                    failed,
                });
            }
            info!(total, failed, "Batch complete");

            slots.into_iter().flatten().collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SharedProfile;
    use crate::raw::{RawAnalysis, RawAnalyze};
    use cadence_library::DecodeError;
    use std::path::Path;
    use std::sync::Arc;

    /// Reports the numeric file stem as the tempo; "bad" stems fail
    struct StemTempo;

    impl RawAnalyze for StemTempo {
        fn analyze_raw(&self, path: &Path) -> Result<RawAnalysis, DecodeError> {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let bpm = stem.parse().map_err(|_| DecodeError::UnsupportedFormat)?;
            Ok(RawAnalysis {
                bpm: Some(bpm),
                bpm_confidence: 1.0,
                ..RawAnalysis::default()
            })
        }
    }

    fn batch(threads: usize) -> BatchAnalyzer {
        BatchAnalyzer::new(CalibratedAnalyzer::new(
            Arc::new(StemTempo),
            SharedProfile::default(),
        ))
        .with_max_threads(threads)
    }

    #[test]
    fn test_results_keep_input_order() {
        let files: Vec<PathBuf> = (90..110).map(|b| PathBuf::from(format!("{}.wav", b))).collect();
        let items = batch(4).analyze_all(files.clone(), None);
        assert_eq!(items.len(), files.len());
        for (item, expected) in items.iter().zip(90..110) {
            assert_eq!(item.result.bpm, Some(expected));
        }
    }

    #[test]
    fn test_progress_reports_failures() {
        let (tx, rx) = unbounded();
        let files = vec![
            PathBuf::from("120.wav"),
            PathBuf::from("bad.wav"),
            PathBuf::from("128.wav"),
        ];
        let items = batch(2).analyze_all(files, Some(tx));
        assert!(items[1].result.is_error());

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(BatchProgress::Started { total: 3 })));
        assert!(matches!(
            events.last(),
            Some(BatchProgress::Complete {
                analyzed: 2,
                failed: 1
            })
        ));
        let analyzed = events
            .iter()
            .filter(|e| matches!(e, BatchProgress::Analyzed { .. }))
            .count();
        assert_eq!(analyzed, 3);
    }

    #[test]
    fn test_empty_batch() {
        assert!(batch(4).analyze_all(Vec::new(), None).is_empty());
    }
}
