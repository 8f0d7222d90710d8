//! Pluggable event output for pipeline consumers.
//!
//! The engine pushes interim text, lock decisions, speaker bindings, and
//! committed utterances through an [`EventSink`]. Production wires a
//! transport adapter here; tests use [`CollectorSink`].

use crate::speaker::SpeakerId;
use crate::types::ConnectionId;
use std::sync::Mutex;

/// One committed utterance, ready for downstream translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub connection_id: ConnectionId,
    /// Absent when no speaker was ever bound on the connection.
    pub speaker_id: Option<SpeakerId>,
    pub language: String,
    pub text: String,
}

/// Pluggable output handler for pipeline events.
/// Pairs with chunk submission for input - this handles everything going out.
pub trait EventSink: Send + Sync + 'static {
    /// Interim text from the locked lane, for live display. May be revised
    /// by later interims and supersede each other.
    fn on_interim_text(&self, connection_id: &ConnectionId, text: &str, language: &str);

    /// The language race has locked. Fires exactly once per connection.
    fn on_language_locked(&self, connection_id: &ConnectionId, language: &str);

    /// A speaker was bound or rebound to the connection.
    fn on_speaker_bound(&self, connection_id: &ConnectionId, speaker_id: &SpeakerId, display_name: &str);

    /// A committed utterance. Utterances for one connection arrive in order.
    fn on_utterance(&self, utterance: Utterance);

    /// The connection is fully torn down; no further events follow for it.
    fn on_connection_closed(&self, connection_id: &ConnectionId);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Everything a [`CollectorSink`] records.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    InterimText {
        connection_id: ConnectionId,
        text: String,
        language: String,
    },
    LanguageLocked {
        connection_id: ConnectionId,
        language: String,
    },
    SpeakerBound {
        connection_id: ConnectionId,
        speaker_id: SpeakerId,
        display_name: String,
    },
    Utterance(Utterance),
    ConnectionClosed {
        connection_id: ConnectionId,
    },
}

/// Collects events for tests and library use.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in arrival order.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    /// Only the committed utterances, in arrival order.
    pub fn utterances(&self) -> Vec<Utterance> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::Utterance(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    /// The locked language for `connection_id`, if the race has concluded.
    pub fn locked_language(&self, connection_id: &ConnectionId) -> Option<String> {
        self.lock().iter().find_map(|event| match event {
            RecordedEvent::LanguageLocked {
                connection_id: id,
                language,
            } if id == connection_id => Some(language.clone()),
            _ => None,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: RecordedEvent) {
        self.lock().push(event);
    }
}

impl EventSink for CollectorSink {
    fn on_interim_text(&self, connection_id: &ConnectionId, text: &str, language: &str) {
        self.record(RecordedEvent::InterimText {
            connection_id: connection_id.clone(),
            text: text.to_string(),
            language: language.to_string(),
        });
    }

    fn on_language_locked(&self, connection_id: &ConnectionId, language: &str) {
        self.record(RecordedEvent::LanguageLocked {
            connection_id: connection_id.clone(),
            language: language.to_string(),
        });
    }

    fn on_speaker_bound(
        &self,
        connection_id: &ConnectionId,
        speaker_id: &SpeakerId,
        display_name: &str,
    ) {
        self.record(RecordedEvent::SpeakerBound {
            connection_id: connection_id.clone(),
            speaker_id: speaker_id.clone(),
            display_name: display_name.to_string(),
        });
    }

    fn on_utterance(&self, utterance: Utterance) {
        self.record(RecordedEvent::Utterance(utterance));
    }

    fn on_connection_closed(&self, connection_id: &ConnectionId) {
        self.record(RecordedEvent::ConnectionClosed {
            connection_id: connection_id.clone(),
        });
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Logs every event at info/debug level. Useful as a default sink.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_interim_text(&self, connection_id: &ConnectionId, text: &str, language: &str) {
        tracing::debug!(connection = %connection_id, language, text, "interim");
    }

    fn on_language_locked(&self, connection_id: &ConnectionId, language: &str) {
        tracing::info!(connection = %connection_id, language, "language locked");
    }

    fn on_speaker_bound(
        &self,
        connection_id: &ConnectionId,
        speaker_id: &SpeakerId,
        display_name: &str,
    ) {
        tracing::info!(connection = %connection_id, speaker = %speaker_id, display_name, "speaker bound");
    }

    fn on_utterance(&self, utterance: Utterance) {
        tracing::info!(
            connection = %utterance.connection_id,
            language = %utterance.language,
            speaker = ?utterance.speaker_id,
            text = %utterance.text,
            "utterance"
        );
    }

    fn on_connection_closed(&self, connection_id: &ConnectionId) {
        tracing::info!(connection = %connection_id, "connection closed");
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
