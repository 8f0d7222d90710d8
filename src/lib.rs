//! voxbridge - Live audio ingestion for speech translation
//!
//! Concurrent transcription racing, speaker fingerprinting, and
//! silence-based utterance segmentation per connection.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod broadcast;
pub mod cancel;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod race;
pub mod segmenter;
pub mod speaker;
pub mod types;

// Core traits (chunks in → events out)
pub use events::{CollectorSink, EventSink, TracingSink, Utterance};
pub use provider::TranscriptionProvider;
pub use speaker::fingerprint::FingerprintExtractor;

// Pipeline
pub use engine::Engine;
pub use pipeline::ConnectionPipeline;

// Error handling
pub use error::{Result, VoxbridgeError};

// Config
pub use config::{Config, RaceConfig, SegmenterConfig, SpeakerConfig};

// Data model
pub use speaker::SpeakerId;
pub use types::{AudioChunk, ChunkMeta, ConnectionId, TranscriptionResult};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when git hash is available, `"0.3.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
