//! Uncalibrated analysis of a file
//!
//! Decoding is the only step that can hang, so it runs on a worker thread
//! with a deadline. Everything after it is bounded CPU work.

use cadence_analysis::{BpmCandidate, MusicalKey, SignalAnalysis, SignalAnalyzer};
use cadence_library::{AnalyzerConfig, AudioDecoder, CancelToken, DecodeError};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Detector output before any correction is applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAnalysis {
    pub bpm: Option<u32>,
    pub bpm_confidence: f32,
    /// Alternative tempos, strongest first
    pub bpm_candidates: Vec<BpmCandidate>,
    pub key: Option<MusicalKey>,
    pub key_confidence: f32,
    pub lufs: Option<f32>,
    pub loudness_range: f32,
}

impl From<SignalAnalysis> for RawAnalysis {
    fn from(analysis: SignalAnalysis) -> Self {
        let bpm_confidence = analysis.tempo.confidence();
        let key_confidence = analysis.key.confidence();
        let loudness = analysis.loudness.into_value();
        let tempo = analysis.tempo.into_value();
        Self {
            bpm: tempo.as_ref().map(|t| t.bpm),
            bpm_confidence,
            bpm_candidates: tempo.map(|t| t.candidates).unwrap_or_default(),
            key: analysis.key.into_value(),
            key_confidence,
            lufs: loudness.map(|l| l.lufs),
            loudness_range: loudness.map(|l| l.range).unwrap_or_default(),
        }
    }
}

/// Anything that can produce raw detector output for a file
pub trait RawAnalyze: Send + Sync {
    fn analyze_raw(&self, path: &Path) -> Result<RawAnalysis, DecodeError>;
}

/// Decoder plus detectors, with a per-file decode deadline
#[derive(Clone)]
pub struct RawAnalyzer {
    decoder: Arc<dyn AudioDecoder>,
    detectors: SignalAnalyzer,
    timeout: Duration,
}

impl RawAnalyzer {
    pub fn new(
        decoder: Arc<dyn AudioDecoder>,
        detectors: SignalAnalyzer,
        timeout: Duration,
    ) -> Self {
        Self {
            decoder,
            detectors,
            timeout,
        }
    }

    pub fn from_config(decoder: Arc<dyn AudioDecoder>, config: &AnalyzerConfig) -> Self {
        Self::new(
            decoder,
            SignalAnalyzer::new(config.onset_threshold),
            config.decode_timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Analyze `path`, giving up when `cancel` trips or the deadline passes
    pub fn analyze_with_cancel(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<RawAnalysis, DecodeError> {
        debug!(path = %path.display(), "Decoding");

        let (tx, rx) = bounded(1);
        let decoder = Arc::clone(&self.decoder);
        let worker_path = path.to_path_buf();
        let worker_cancel = cancel.clone();
        thread::spawn(move || {
            let _ = tx.send(decoder.decode(&worker_path, &worker_cancel));
        });

        let signal = match rx.recv_timeout(self.timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                warn!(path = %path.display(), timeout = ?self.timeout, "Decode timed out");
                return Err(DecodeError::TimedOut(self.timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DecodeError::Decode("decoder worker exited".to_string()));
            }
        };

        debug!(
            path = %path.display(),
            secs = signal.duration_secs(),
            "Decoded"
        );
        Ok(self.detectors.analyze(&signal).into())
    }
}

impl RawAnalyze for RawAnalyzer {
    fn analyze_raw(&self, path: &Path) -> Result<RawAnalysis, DecodeError> {
        self.analyze_with_cancel(path, &CancelToken::new())
    }
}
