//! Default tuning constants for voxbridge.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication. The race and
//! segmentation thresholds are empirically chosen; treat them as starting
//! points, not invariants — every one of them is overridable through
//! [`crate::config::Config`].

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Poll interval for the language race coordinator in milliseconds.
///
/// The coordinator re-evaluates the lock conditions on this fixed tick.
/// Cancelled lanes are guaranteed to cease within one tick.
pub const RACE_POLL_INTERVAL_MS: u64 = 400;

/// Minimum running confidence before a language can win the race.
pub const CONFIDENCE_THRESHOLD: f32 = 0.75;

/// Required lead over the runner-up's running confidence.
pub const CONFIDENCE_GAP: f32 = 0.2;

/// Alternative to the confidence gap: a lane wins if it has this many more
/// results than its closest competitor (and clears the absolute threshold).
pub const RESULT_COUNT_LEAD: usize = 6;

/// Results a lane needs before it can win on confidence at all. A single
/// result can be a fluke; the rule wants corroboration.
pub const MIN_LOCK_RESULTS: usize = 2;

/// Hard ceiling on racing in milliseconds.
///
/// If no candidate wins before this elapses, the race falls back to the
/// first candidate in priority order.
pub const RACE_TIMEOUT_MS: u64 = 10_000;

/// Weight applied to interim result confidence when computing a lane's
/// running confidence. Final results count at full weight.
pub const INTERIM_CONFIDENCE_WEIGHT: f32 = 0.8;

/// Silence duration in milliseconds before an utterance boundary fires.
///
/// 3000ms allows for natural pauses in speech without prematurely
/// splitting a sentence across two utterances.
pub const SILENCE_WINDOW_MS: u64 = 3000;

/// Tick of the shared background scan that checks all connections for
/// silence timeouts. The boundary contract is "fire within one tick of the
/// silence window elapsing".
pub const SCAN_TICK_MS: u64 = 1000;

/// Cosine similarity above which a slow-path embedding is considered the
/// same voice as an existing confirmed profile and merged into it.
pub const MERGE_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Cosine similarity above which the fast path reuses an existing roster
/// profile instead of creating a provisional one. Deliberately looser than
/// the merge threshold: the fast fingerprint is built from very little audio.
pub const PROVISIONAL_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Minimum accumulated audio in milliseconds before the fast path attempts
/// a fingerprint.
pub const MIN_FAST_PATH_AUDIO_MS: u64 = 600;

/// Rolling cap on buffered utterance audio, in milliseconds. A connection
/// that streams without ever committing an utterance keeps only the most
/// recent window; 30s is far more audio than a fingerprint needs.
pub const MAX_UTTERANCE_AUDIO_MS: u64 = 30_000;

/// Blend factor for absorbing a new embedding sample into an existing
/// profile: `old * (1 - alpha) + new * alpha`, renormalized.
pub const FINGERPRINT_ALPHA: f32 = 0.3;

/// Number of log-spaced spectral bands in the default voice embedding.
pub const EMBEDDING_BANDS: usize = 24;

/// Pitch search range in Hz for the autocorrelation estimator.
pub const PITCH_MIN_HZ: f32 = 60.0;
pub const PITCH_MAX_HZ: f32 = 400.0;

/// Marker text carried by the sentinel result a provider emits when it
/// cannot complete. Must be filtered out before text accumulation; it is
/// never real transcript.
pub const SENTINEL_TEXT: &str = "[transcription-failed]";

/// How much audio the remote provider buffers before posting a span to the
/// recognition backend, in milliseconds.
pub const REMOTE_FLUSH_MS: u64 = 1000;
