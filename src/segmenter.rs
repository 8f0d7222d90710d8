//! Utterance segmentation.
//!
//! Accumulates final transcription fragments per connection and declares an
//! utterance boundary after a continuous silence window with no new finals.
//! Interim results keep the display fresh and count as activity, but only
//! finals ever reach the committed transcript.

use crate::config::SegmenterConfig;
use crate::types::TranscriptionResult;
use std::time::Duration;
use tokio::time::Instant;

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real clock. Uses the tokio instant so tests driving virtual time see
/// boundaries fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A completed utterance drained from the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceText {
    pub text: String,
    pub language: String,
}

/// Per-connection fragment accumulator.
///
/// Single-writer: only the locked lane feeds results in, so fragment order
/// is the lane's emission order.
pub struct UtteranceAccumulator {
    config: SegmenterConfig,
    fragments: Vec<String>,
    language: Option<String>,
    /// Latest interim, display-only. Superseded by every newer result.
    interim: Option<String>,
    last_activity: Option<Instant>,
}

impl UtteranceAccumulator {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            fragments: Vec::new(),
            language: None,
            interim: None,
            last_activity: None,
        }
    }

    /// Feeds one result from the locked lane. Sentinel results are dropped:
    /// they mark a failed span, not speech, and must not extend activity.
    pub fn apply(&mut self, result: &TranscriptionResult, now: Instant) {
        if result.is_sentinel() {
            return;
        }

        self.last_activity = Some(now);
        self.language.get_or_insert_with(|| result.language.clone());

        if result.is_final {
            let trimmed = result.text.trim();
            if !trimmed.is_empty() {
                self.fragments.push(trimmed.to_string());
            }
            self.interim = None;
        } else {
            self.interim = Some(result.text.clone());
        }
    }

    /// Whether the silence window has elapsed since the last activity.
    pub fn boundary_due(&self, now: Instant) -> bool {
        match self.last_activity {
            Some(last) => now.duration_since(last) >= self.silence_window(),
            None => false,
        }
    }

    /// Drains the accumulator at a boundary. Returns `None` when no final
    /// fragment arrived (interim-only activity commits nothing), but resets
    /// state either way.
    pub fn take_utterance(&mut self) -> Option<UtteranceText> {
        self.interim = None;
        self.last_activity = None;
        let language = self.language.clone();

        if self.fragments.is_empty() {
            return None;
        }

        let text = std::mem::take(&mut self.fragments).join(" ");
        Some(UtteranceText {
            text,
            language: language.unwrap_or_default(),
        })
    }

    /// Latest interim text, for live display.
    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    /// True when finals are pending commit.
    pub fn has_pending(&self) -> bool {
        !self.fragments.is_empty()
    }

    fn silence_window(&self) -> Duration {
        Duration::from_millis(self.config.silence_window_ms)
    }
}
