//! Multi-language transcription racing.
//!
//! One lane per candidate language streams the same audio through the
//! provider. Lane standings are scored by running confidence until one lane
//! wins, the speaker's known language short-circuits the race, or the hard
//! timeout falls back to the first candidate. The decision is monotonic:
//! once locked, a connection never re-races.

pub mod coordinator;
pub mod state;

pub use coordinator::{LaneHandle, LanguageRaceCoordinator, spawn_lanes};
pub use state::RaceState;

/// Why the race locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// A lane cleared the confidence threshold with a decisive lead.
    Confidence,
    /// The bound speaker had a known language among the candidates.
    Speaker,
    /// No lane won in time; fell back to the first candidate.
    Timeout,
}

/// The race's final, immutable decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDecision {
    pub language: String,
    pub reason: LockReason,
}
