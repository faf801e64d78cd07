//! Audio file decoding into mono signals

use cadence_analysis::AudioSignal;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

/// Default analysis sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Errors that can occur while decoding a file
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Unsupported format")]
    UnsupportedFormat,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("File decoded to zero samples")]
    Empty,
    #[error("Decoding was cancelled")]
    Cancelled,
    #[error("Decoding timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<SymphoniaError> for DecodeError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::IoError(io) => DecodeError::Io(io),
            SymphoniaError::Unsupported(_) => DecodeError::UnsupportedFormat,
            other => DecodeError::Decode(other.to_string()),
        }
    }
}

/// Shared flag that asks a running decode to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turns a file into a mono signal at a fixed sample rate
pub trait AudioDecoder: Send + Sync {
    /// Decode the whole file, checking `cancel` as it goes
    fn decode(&self, path: &Path, cancel: &CancelToken) -> Result<AudioSignal, DecodeError>;

    /// Sample rate of every signal this decoder produces
    fn sample_rate(&self) -> u32;
}

/// Audio file decoder using Symphonia
#[derive(Debug, Clone)]
pub struct SymphoniaDecoder {
    target_sample_rate: u32,
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SymphoniaDecoder {
    /// Create a decoder producing 22.05 kHz mono
    pub fn new() -> Self {
        Self::with_sample_rate(DEFAULT_SAMPLE_RATE)
    }

    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode to interleaved samples, returning (samples, sample rate, channels)
    fn decode_interleaved(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<(Vec<f32>, u32, usize), DecodeError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let source_sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

        let mut decoder =
            symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(DecodeError::Cancelled);
            }

            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            // Corrupt packets are skipped
            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        Ok((samples, source_sample_rate, channels.max(1)))
    }

    /// Resample mono audio to the target sample rate
    fn resample(&self, samples: &[f32], source_rate: u32) -> Result<Vec<f32>, DecodeError> {
        use rubato::{FftFixedInOut, Resampler};

        let mut resampler = FftFixedInOut::<f32>::new(
            source_rate as usize,
            self.target_sample_rate as usize,
            1024,
            1,
        )
        .map_err(|e| DecodeError::Decode(e.to_string()))?;

        let chunk_size = resampler.input_frames_next();
        let expected = (samples.len() as u64 * self.target_sample_rate as u64
            / source_rate as u64) as usize;
        let mut output: Vec<f32> = Vec::with_capacity(expected + chunk_size);

        for chunk in samples.chunks(chunk_size) {
            let input = if chunk.len() == chunk_size {
                resampler.process(&[chunk], None)
            } else {
                // Pad the tail with silence
                let mut padded = chunk.to_vec();
                padded.resize(chunk_size, 0.0);
                resampler.process(&[padded.as_slice()], None)
            };
            let mut resampled = input.map_err(|e| DecodeError::Decode(e.to_string()))?;
            if let Some(channel) = resampled.pop() {
                output.extend(channel);
            }
        }

        output.truncate(expected);
        Ok(output)
    }
}

/// Average interleaved channels into one
pub fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, cancel: &CancelToken) -> Result<AudioSignal, DecodeError> {
        debug!(path = %path.display(), "Decoding");

        let (interleaved, source_rate, channels) = self.decode_interleaved(path, cancel)?;
        let mono = mix_to_mono(&interleaved, channels);
        if mono.is_empty() {
            return Err(DecodeError::Empty);
        }

        let samples = if source_rate != self.target_sample_rate {
            self.resample(&mono, source_rate)?
        } else {
            mono
        };

        debug!(
            path = %path.display(),
            source_rate,
            channels,
            samples = samples.len(),
            "Decoded"
        );

        AudioSignal::new(samples, self.target_sample_rate).map_err(|_| DecodeError::Empty)
    }

    fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }
}
