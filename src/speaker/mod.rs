//! Speaker fingerprinting and two-speed identification.
//!
//! A fast, low-confidence guess picks a voice early; a slower, higher-quality
//! embedding per committed utterance either confirms it, merges it into an
//! existing roster profile, or promotes it. External speaker ids stay stable
//! across that reconciliation.

pub mod fingerprint;
pub mod identifier;
pub mod roster;

use crate::speaker::fingerprint::VoiceFingerprint;
use std::fmt;

/// Stable identifier for one voice within a session scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpeakerId(String);

impl SpeakerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One roster entry.
#[derive(Debug, Clone)]
pub struct SpeakerProfile {
    pub speaker_id: SpeakerId,
    pub display_name: String,
    pub fingerprint: VoiceFingerprint,
    /// Language this speaker was previously heard in, if any. Feeds the
    /// race coordinator's short-circuit.
    pub known_language: Option<String>,
    /// Provisional profiles come from the fast path and may later be merged
    /// away; confirmed profiles are permanent.
    pub confirmed: bool,
}
