//! Per-connection pipeline assembly.
//!
//! One connection owns a broadcaster feeding N racing language lanes plus a
//! speaker tap, a race coordinator task, and an utterance accumulator fed by
//! the locked lane. Chunks are validated exactly once at `submit_chunk`;
//! everything downstream trusts them.

use crate::audio;
use crate::broadcast::AudioBroadcaster;
use crate::cancel::{CancelHandle, cancel_pair};
use crate::config::Config;
use crate::error::{Result, VoxbridgeError};
use crate::events::{EventSink, Utterance};
use crate::provider::TranscriptionProvider;
use crate::race::coordinator::spawn_lanes;
use crate::race::{LanguageRaceCoordinator, LockDecision};
use crate::segmenter::{Clock, UtteranceAccumulator};
use crate::speaker::fingerprint::FingerprintExtractor;
use crate::speaker::identifier::SpeakerIdentifier;
use crate::speaker::roster::SpeakerRoster;
use crate::types::{AudioChunk, ChunkMeta, ConnectionId};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio::task::JoinHandle;

/// One live connection's ingestion pipeline.
pub struct ConnectionPipeline {
    connection_id: ConnectionId,
    broadcaster: Mutex<AudioBroadcaster>,
    identifier: Arc<SpeakerIdentifier>,
    accumulator: Mutex<UtteranceAccumulator>,
    decision_rx: watch::Receiver<Option<LockDecision>>,
    last_sequence: Mutex<Option<u64>>,
    sink: Arc<dyn EventSink>,
    cancel: CancelHandle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: Instant,
}

impl ConnectionPipeline {
    /// Assembles and starts the pipeline for one connection.
    pub fn spawn(
        connection_id: ConnectionId,
        config: &Config,
        provider: Arc<dyn TranscriptionProvider>,
        roster: Arc<SpeakerRoster>,
        extractor: Arc<dyn FingerprintExtractor>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let mut broadcaster = AudioBroadcaster::new();
        let mut feeds = Vec::new();
        for language in &config.race.candidates {
            feeds.push((language.clone(), broadcaster.register(language)));
        }
        let speaker_feed = broadcaster.register("speaker");

        let identifier = Arc::new(SpeakerIdentifier::new(
            roster,
            extractor,
            config.speaker.clone(),
        ));

        let (lanes, tagged_rx) = spawn_lanes(provider, feeds);
        let (decision_tx, decision_rx) = watch::channel(None);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_token) = cancel_pair();

        let coordinator = LanguageRaceCoordinator::new(config.race.clone());
        let coordinator_task = tokio::spawn(coordinator.run(
            lanes,
            tagged_rx,
            identifier.binding_watch(),
            decision_tx,
            output_tx,
            cancel_token,
        ));

        let tap_task = tokio::spawn(Self::speaker_tap(
            connection_id.clone(),
            speaker_feed,
            Arc::clone(&identifier),
            Arc::clone(&sink),
        ));

        let pipeline = Arc::new(Self {
            connection_id: connection_id.clone(),
            broadcaster: Mutex::new(broadcaster),
            identifier,
            accumulator: Mutex::new(UtteranceAccumulator::new(config.segmenter.clone())),
            decision_rx: decision_rx.clone(),
            last_sequence: Mutex::new(None),
            sink: Arc::clone(&sink),
            cancel,
            tasks: Mutex::new(Vec::new()),
            started: Instant::now(),
        });

        let results_task = tokio::spawn(Self::consume_results(
            Arc::clone(&pipeline),
            output_rx,
            clock,
        ));
        let lock_task = tokio::spawn(Self::announce_lock(connection_id, decision_rx, sink));

        {
            let mut tasks = pipeline.lock_tasks();
            tasks.push(coordinator_task);
            tasks.push(tap_task);
            tasks.push(results_task);
            tasks.push(lock_task);
        }
        pipeline
    }

    /// Validates and fans one chunk out to every lane.
    ///
    /// The sequence must advance; a replayed or reordered chunk is rejected
    /// rather than risk double-feeding the recognizers.
    pub fn submit_chunk(&self, meta: ChunkMeta) -> Result<()> {
        let chunk = meta.validate()?;

        {
            let mut last = self
                .last_sequence
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(last_seq) = *last
                && chunk.sequence <= last_seq
            {
                tracing::warn!(
                    connection = %self.connection_id,
                    sequence = chunk.sequence,
                    last = last_seq,
                    "non-monotonic chunk sequence"
                );
                return Err(VoxbridgeError::ChunkRejected {
                    message: format!(
                        "sequence {} does not advance past {}",
                        chunk.sequence, last_seq
                    ),
                });
            }
            *last = Some(chunk.sequence);
        }

        self.broadcaster
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .submit(chunk);
        Ok(())
    }

    /// Signals end of the inbound stream. Lanes finish their tails and wind
    /// down on their own.
    pub fn finish(&self) {
        self.broadcaster
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .finish();
    }

    /// True once the language race has settled.
    pub fn is_locked(&self) -> bool {
        self.decision_rx.borrow().is_some()
    }

    /// Time since the pipeline was assembled.
    pub fn uptime(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Commits a pending utterance if the silence window has elapsed.
    pub fn scan(&self, now: Instant) {
        let due = self
            .accumulator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .boundary_due(now);
        if due {
            self.commit_boundary();
        }
    }

    /// Commits whatever is pending, regardless of the silence window. Used
    /// at teardown so a disconnect never swallows committed finals.
    pub fn flush(&self) {
        self.commit_boundary();
    }

    /// Stops the pipeline and joins every task. `graceful` lets an already
    /// locked connection drain its tail instead of cutting lanes off.
    pub async fn shutdown(&self, graceful: bool) {
        self.finish();
        if !graceful {
            self.cancel.cancel();
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_tasks());
        for task in tasks {
            let _ = task.await;
        }
        self.cancel.cancel();
    }

    fn commit_boundary(&self) {
        let taken = self
            .accumulator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take_utterance();
        let audio = self.identifier.take_utterance_audio();

        let Some(utterance) = taken else {
            return;
        };

        let locked = self
            .decision_rx
            .borrow()
            .as_ref()
            .map(|d| d.language.clone());
        let language = locked.unwrap_or_else(|| utterance.language.clone());

        let before = self.identifier.current_binding();
        let binding = match self.identifier.confirm_utterance(&audio, Some(&language)) {
            Ok(binding) => binding,
            Err(e) => {
                tracing::debug!(
                    connection = %self.connection_id,
                    error = %e,
                    "utterance fingerprint unavailable, keeping fast binding"
                );
                before.clone()
            }
        };

        if let Some(binding) = &binding
            && before.as_ref() != Some(binding)
        {
            self.sink.on_speaker_bound(
                &self.connection_id,
                &binding.speaker_id,
                &binding.display_name,
            );
        }

        self.sink.on_utterance(Utterance {
            connection_id: self.connection_id.clone(),
            speaker_id: binding.map(|b| b.speaker_id),
            language,
            text: utterance.text,
        });
    }

    async fn speaker_tap(
        connection_id: ConnectionId,
        mut feed: mpsc::UnboundedReceiver<AudioChunk>,
        identifier: Arc<SpeakerIdentifier>,
        sink: Arc<dyn EventSink>,
    ) {
        while let Some(chunk) = feed.recv().await {
            let samples = match audio::decode_samples(&chunk.payload) {
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!(
                        connection = %connection_id,
                        sequence = chunk.sequence,
                        error = %e,
                        "undecodable chunk skipped by speaker path"
                    );
                    continue;
                }
            };

            match identifier.ingest_samples(&samples) {
                Ok(Some(binding)) => {
                    sink.on_speaker_bound(
                        &connection_id,
                        &binding.speaker_id,
                        &binding.display_name,
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(connection = %connection_id, error = %e, "fast path skipped");
                }
            }
        }
    }

    async fn consume_results(
        pipeline: Arc<ConnectionPipeline>,
        mut output_rx: mpsc::UnboundedReceiver<crate::types::TranscriptionResult>,
        clock: Arc<dyn Clock>,
    ) {
        while let Some(result) = output_rx.recv().await {
            let interim = (!result.is_final && !result.is_sentinel())
                .then(|| (result.text.clone(), result.language.clone()));

            pipeline
                .accumulator
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .apply(&result, clock.now());

            if let Some((text, language)) = interim {
                pipeline
                    .sink
                    .on_interim_text(&pipeline.connection_id, &text, &language);
            }
        }
    }

    async fn announce_lock(
        connection_id: ConnectionId,
        mut decision_rx: watch::Receiver<Option<LockDecision>>,
        sink: Arc<dyn EventSink>,
    ) {
        loop {
            let decision = decision_rx.borrow_and_update().clone();
            if let Some(decision) = decision {
                sink.on_language_locked(&connection_id, &decision.language);
                return;
            }
            if decision_rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
