//! Chromagram (12-bin pitch class energy) via STFT
//!
//! Frames of 4096 samples with 50% overlap are Hann-windowed and transformed.
//! Every spectrum bin between 60 Hz and 4 kHz adds its magnitude to pitch
//! class `floor(12 * log2(f / C0)) mod 12`. The accumulated vector is scaled
//! so its largest element is 1.0.

use crate::signal::AudioSignal;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// STFT frame length
pub const FRAME_SIZE: usize = 4096;

/// STFT hop (50% overlap)
pub const HOP_SIZE: usize = FRAME_SIZE / 2;

/// Lowest frequency considered musical
pub const MIN_FREQ: f32 = 60.0;

/// Highest frequency considered musical
pub const MAX_FREQ: f32 = 4000.0;

/// Reference frequency for A4
const A4_FREQ: f32 = 440.0;

/// Frequency of C0 relative to A440 (57 semitones below A4)
pub fn c0_frequency() -> f32 {
    A4_FREQ * 2f32.powf(-4.75)
}

/// Pitch class (0 = C) for a frequency, using floor binning above C0
pub fn pitch_class(freq: f32) -> u8 {
    let semitones = 12.0 * (freq / c0_frequency()).log2();
    (semitones.floor() as i32).rem_euclid(12) as u8
}

/// 12-element pitch class energy vector, max-normalized
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChromaVector(pub [f32; 12]);

impl ChromaVector {
    /// Scale so the largest element is 1.0; an all-zero vector stays zero
    pub fn normalized(mut self) -> Self {
        let max = self.0.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for v in &mut self.0 {
                *v /= max;
            }
        }
        self
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    pub fn as_array(&self) -> &[f32; 12] {
        &self.0
    }

    /// Index of the strongest pitch class
    pub fn peak(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.0.iter().enumerate() {
            if v > self.0[best] {
                best = i;
            }
        }
        best
    }
}

/// Builds chroma vectors for signals at one sample rate
pub struct ChromaBuilder {
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    /// Pitch class per spectrum bin, None outside the musical range
    bin_to_pitch_class: Vec<Option<u8>>,
}

impl ChromaBuilder {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FRAME_SIZE);

        let window: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FRAME_SIZE as f32).cos()))
            .collect();

        Self {
            fft,
            window,
            bin_to_pitch_class: Self::pitch_class_mapping(sample_rate),
        }
    }

    fn pitch_class_mapping(sample_rate: u32) -> Vec<Option<u8>> {
        let nyquist = sample_rate as f32 / 2.0;
        (0..FRAME_SIZE / 2)
            .map(|bin| {
                let freq = bin as f32 * sample_rate as f32 / FRAME_SIZE as f32;
                if bin == 0 || freq < MIN_FREQ || freq > MAX_FREQ || freq >= nyquist {
                    None
                } else {
                    Some(pitch_class(freq))
                }
            })
            .collect()
    }

    /// Number of full frames the signal provides
    pub fn frame_count(len: usize) -> usize {
        if len < FRAME_SIZE {
            0
        } else {
            (len - FRAME_SIZE) / HOP_SIZE + 1
        }
    }

    /// Compute the max-normalized chromagram of a signal
    ///
    /// Signals shorter than one frame yield an all-zero vector.
    pub fn compute(&self, signal: &AudioSignal) -> ChromaVector {
        let samples = signal.samples();
        let mut chroma = [0.0f32; 12];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); FRAME_SIZE];

        for frame in 0..Self::frame_count(samples.len()) {
            let start = frame * HOP_SIZE;
            for (slot, (s, w)) in buffer
                .iter_mut()
                .zip(samples[start..start + FRAME_SIZE].iter().zip(&self.window))
            {
                *slot = Complex::new(s * w, 0.0);
            }

            self.fft.process(&mut buffer);

            for (bin, value) in buffer[..FRAME_SIZE / 2].iter().enumerate() {
                if let Some(pc) = self.bin_to_pitch_class[bin] {
                    chroma[pc as usize] += value.norm();
                }
            }
        }

        ChromaVector(chroma).normalized()
    }
}

/// Compute a chromagram with a one-off builder
pub fn compute_chromagram(signal: &AudioSignal) -> ChromaVector {
    ChromaBuilder::new(signal.sample_rate()).compute(signal)
}
