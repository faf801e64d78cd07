//! Collaborator adapters for Cadence - decoding, file discovery, persistence,
//! and configuration

mod config;
mod decoder;
mod scanner;
mod store;

pub use config::AnalyzerConfig;
pub use decoder::{
    mix_to_mono, AudioDecoder, CancelToken, DecodeError, SymphoniaDecoder, DEFAULT_SAMPLE_RATE,
};
pub use scanner::{collect_audio_files, expand_paths, ScanConfig};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
