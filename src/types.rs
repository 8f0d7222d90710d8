//! Core data types shared across the ingestion pipeline.

use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier for one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Raw chunk metadata as delivered by the transport, before validation.
///
/// Validated exactly once at ingress; everything downstream works with
/// [`AudioChunk`] and never re-checks these fields.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// Session the chunk belongs to.
    pub session_id: String,
    /// Monotonic sequence number within the session.
    pub sequence: u64,
    /// Compressed or raw audio bytes.
    pub payload: Vec<u8>,
    /// Capture timestamp in milliseconds since session start.
    pub timestamp_ms: u64,
}

impl ChunkMeta {
    /// Validates the metadata and converts it into an immutable chunk.
    pub fn validate(self) -> Result<AudioChunk> {
        if self.session_id.is_empty() {
            return Err(VoxbridgeError::ChunkRejected {
                message: "missing session id".to_string(),
            });
        }
        if self.payload.is_empty() {
            return Err(VoxbridgeError::ChunkRejected {
                message: format!("empty payload at sequence {}", self.sequence),
            });
        }
        Ok(AudioChunk {
            sequence: self.sequence,
            payload: self.payload.into(),
            timestamp_ms: self.timestamp_ms,
        })
    }
}

/// An immutable audio chunk flowing through the pipeline.
///
/// Cloning is cheap (the payload is shared), which is what lets the
/// broadcaster hand the same chunk to every consumer without copying audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonic sequence number for ordering and gap detection.
    pub sequence: u64,
    /// Audio bytes, shared across consumers.
    pub payload: Arc<[u8]>,
    /// Capture timestamp in milliseconds since session start.
    pub timestamp_ms: u64,
}

impl AudioChunk {
    /// Creates a chunk directly, bypassing ingress validation. Intended for
    /// internal producers and tests that already hold trusted data.
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
            timestamp_ms: 0,
        }
    }
}

/// One recognition result emitted by a transcription provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Recognized text.
    pub text: String,
    /// Language the provider recognized against (BCP-47, e.g. "en-US").
    pub language: String,
    /// Final results are terminal for their span and accumulate; interim
    /// results are superseded by later ones.
    pub is_final: bool,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
    /// Offset of the recognized span from stream start.
    pub offset: Duration,
    /// Duration of the recognized span.
    pub duration: Duration,
}

impl TranscriptionResult {
    /// Creates a final result.
    pub fn final_result(text: &str, language: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            language: language.to_string(),
            is_final: true,
            confidence,
            offset: Duration::ZERO,
            duration: Duration::ZERO,
        }
    }

    /// Creates an interim result.
    pub fn interim(text: &str, language: &str, confidence: f32) -> Self {
        Self {
            is_final: false,
            ..Self::final_result(text, language, confidence)
        }
    }

    /// The degraded result a provider emits when it cannot complete.
    ///
    /// Carries near-zero confidence and marker text so the race still sees
    /// that the lane produced *something*, while the segmenter filters it
    /// out before it can reach the transcript.
    pub fn sentinel(language: &str) -> Self {
        Self {
            text: defaults::SENTINEL_TEXT.to_string(),
            language: language.to_string(),
            is_final: true,
            confidence: 0.0,
            offset: Duration::ZERO,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if this is the provider-failure sentinel. Sentinels must
    /// never be concatenated into a transcript.
    pub fn is_sentinel(&self) -> bool {
        self.confidence <= f32::EPSILON && self.text == defaults::SENTINEL_TEXT
    }
}
