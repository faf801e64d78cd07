//! Tempo estimation from onset intervals
//!
//! Inter-onset intervals are quantized into 50 ms buckets; the most common
//! bucket is taken as the beat period and folded into the 60-220 BPM range.

use crate::detection::{Detection, UndetectedReason};
use crate::onset::{detect_onsets, DEFAULT_ONSET_THRESHOLD};
use crate::signal::AudioSignal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Histogram bucket width in seconds
pub const INTERVAL_BUCKET_SECS: f32 = 0.05;

/// Lowest tempo reported after octave correction
pub const MIN_BPM: f32 = 60.0;

/// Highest tempo reported after octave correction
pub const MAX_BPM: f32 = 220.0;

/// Minimum number of onsets needed for an estimate
pub const MIN_ONSETS: usize = 4;

/// Beat period used when no interval could be bucketed (120 BPM)
const DEFAULT_INTERVAL_SECS: f32 = 0.5;

/// Maximum number of alternative tempo candidates reported
const MAX_CANDIDATES: usize = 3;

/// An alternative tempo reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BpmCandidate {
    pub value: u32,
    /// Share of intervals supporting this candidate (0.0 - 1.0)
    pub weight: f32,
}

/// Tempo estimate with alternatives
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    pub bpm: u32,
    pub candidates: Vec<BpmCandidate>,
}

/// Count of inter-onset intervals per 50 ms bucket
#[derive(Debug, Default, Clone)]
pub struct IntervalHistogram {
    /// Bucket index (interval / 50 ms, rounded) -> count
    buckets: BTreeMap<u32, usize>,
}

impl IntervalHistogram {
    /// Build a histogram from consecutive onset times
    ///
    /// Intervals shorter than half a bucket are dropped.
    pub fn from_onsets(onsets: &[f32]) -> Self {
        let mut buckets = BTreeMap::new();
        for pair in onsets.windows(2) {
            let bucket = ((pair[1] - pair[0]) / INTERVAL_BUCKET_SECS).round();
            if bucket >= 1.0 {
                *buckets.entry(bucket as u32).or_insert(0) += 1;
            }
        }
        Self { buckets }
    }

    pub fn total(&self) -> usize {
        self.buckets.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Most common interval in seconds with its count
    ///
    /// Ties go to the shorter interval.
    pub fn dominant(&self) -> Option<(f32, usize)> {
        let mut best: Option<(u32, usize)> = None;
        for (&bucket, &count) in &self.buckets {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((bucket, count));
            }
        }
        best.map(|(bucket, count)| (bucket as f32 * INTERVAL_BUCKET_SECS, count))
    }

    /// All buckets as (interval seconds, count), most frequent first
    fn ranked(&self) -> Vec<(f32, usize)> {
        let mut ranked: Vec<(f32, usize)> = self
            .buckets
            .iter()
            .map(|(&b, &c)| (b as f32 * INTERVAL_BUCKET_SECS, c))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

/// Fold a tempo into [MIN_BPM, MAX_BPM] by doubling or halving
///
/// Returns None when the value cannot be folded into range.
pub fn fold_octave(bpm: f32) -> Option<f32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }
    let mut bpm = bpm;
    while bpm < MIN_BPM {
        bpm *= 2.0;
    }
    while bpm > MAX_BPM {
        bpm /= 2.0;
    }
    (MIN_BPM..=MAX_BPM).contains(&bpm).then_some(bpm)
}

/// Onset-histogram tempo detector
#[derive(Debug, Clone, Copy)]
pub struct TempoDetector {
    onset_threshold: f32,
}

impl Default for TempoDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ONSET_THRESHOLD)
    }
}

impl TempoDetector {
    /// Create a detector with the given relative onset threshold
    pub fn new(onset_threshold: f32) -> Self {
        Self { onset_threshold }
    }

    /// Estimate tempo for a signal
    pub fn detect(&self, signal: &AudioSignal) -> Detection<TempoEstimate> {
        let onsets = detect_onsets(signal, self.onset_threshold);
        if onsets.len() < MIN_ONSETS {
            return Detection::Undetected(UndetectedReason::TooFewOnsets {
                found: onsets.len(),
            });
        }
        Self::estimate_from_onsets(&onsets)
    }

    /// Estimate tempo from onset times (seconds)
    pub fn estimate_from_onsets(onsets: &[f32]) -> Detection<TempoEstimate> {
        if onsets.len() < MIN_ONSETS {
            return Detection::Undetected(UndetectedReason::TooFewOnsets {
                found: onsets.len(),
            });
        }

        let histogram = IntervalHistogram::from_onsets(onsets);
        let (interval, count) = histogram
            .dominant()
            .unwrap_or((DEFAULT_INTERVAL_SECS, 0));

        let raw_bpm = (60.0 / interval).round();
        let Some(bpm) = fold_octave(raw_bpm) else {
            return Detection::Undetected(UndetectedReason::OutOfRange { bpm: raw_bpm });
        };
        let bpm = bpm.round() as u32;

        let total = histogram.total();
        let confidence = if total > 0 {
            count as f32 / total as f32
        } else {
            0.0
        };

        let mut candidates: Vec<BpmCandidate> = Vec::new();
        for (alt_interval, alt_count) in histogram.ranked() {
            if candidates.len() >= MAX_CANDIDATES {
                break;
            }
            let Some(alt) = fold_octave((60.0 / alt_interval).round()) else {
                continue;
            };
            let value = alt.round() as u32;
            if value == bpm || candidates.iter().any(|c| c.value == value) {
                continue;
            }
            candidates.push(BpmCandidate {
                value,
                weight: alt_count as f32 / total as f32,
            });
        }

        Detection::detected(TempoEstimate { bpm, candidates }, confidence)
    }
}

/// Detect tempo with the default onset threshold
pub fn detect_bpm(signal: &AudioSignal) -> Detection<TempoEstimate> {
    TempoDetector::default().detect(signal)
}
