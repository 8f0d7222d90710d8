//! The race coordinator task.
//!
//! Spawns one provider lane per candidate language, scores their output, and
//! settles on a single language. Losing lanes are cancelled at lock so the
//! provider can release their upstream sessions; the winner's buffered
//! results are replayed into the transcript in arrival order, then its live
//! results are forwarded until the connection ends.

use crate::cancel::{CancelHandle, CancelToken, cancel_pair};
use crate::config::RaceConfig;
use crate::provider::TranscriptionProvider;
use crate::race::state::RaceState;
use crate::race::{LockDecision, LockReason};
use crate::speaker::identifier::SpeakerBinding;
use crate::types::{AudioChunk, TranscriptionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One running lane: a provider session plus the forwarder that tags its
/// results with the lane language.
pub struct LaneHandle {
    language: String,
    cancel: CancelHandle,
    provider_task: JoinHandle<()>,
    forward_task: JoinHandle<()>,
}

impl LaneHandle {
    pub fn language(&self) -> &str {
        &self.language
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn join(self) {
        let _ = self.provider_task.await;
        let _ = self.forward_task.await;
    }
}

/// Spawns one lane per `(language, chunk feed)` pair. Returns the handles
/// and a merged stream of `(language, result)` pairs.
pub fn spawn_lanes(
    provider: Arc<dyn TranscriptionProvider>,
    feeds: Vec<(String, mpsc::UnboundedReceiver<AudioChunk>)>,
) -> (
    Vec<LaneHandle>,
    mpsc::UnboundedReceiver<(String, TranscriptionResult)>,
) {
    let (tagged_tx, tagged_rx) = mpsc::unbounded_channel();
    let mut lanes = Vec::with_capacity(feeds.len());

    for (language, chunks_rx) in feeds {
        let (cancel_handle, cancel_token) = cancel_pair();
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();

        let provider_task = {
            let provider = Arc::clone(&provider);
            let language = language.clone();
            tokio::spawn(async move {
                provider
                    .transcribe(chunks_rx, &language, cancel_token, results_tx)
                    .await;
            })
        };

        let forward_task = {
            let tagged_tx = tagged_tx.clone();
            let language = language.clone();
            tokio::spawn(async move {
                while let Some(result) = results_rx.recv().await {
                    if tagged_tx.send((language.clone(), result)).is_err() {
                        break;
                    }
                }
            })
        };

        tracing::debug!(language = %language, provider = provider.name(), "lane spawned");
        lanes.push(LaneHandle {
            language,
            cancel: cancel_handle,
            provider_task,
            forward_task,
        });
    }

    (lanes, tagged_rx)
}

/// Runs the race for one connection and keeps serving the winning lane
/// afterwards.
pub struct LanguageRaceCoordinator {
    config: RaceConfig,
}

impl LanguageRaceCoordinator {
    pub fn new(config: RaceConfig) -> Self {
        Self { config }
    }

    /// Drives the race to a decision, publishes it on `decision_tx`, then
    /// forwards the winning lane's results to `output_tx` until the lane
    /// ends or `cancel` fires. Consumes the lanes; they are all joined
    /// before this returns.
    pub async fn run(
        self,
        lanes: Vec<LaneHandle>,
        mut tagged_rx: mpsc::UnboundedReceiver<(String, TranscriptionResult)>,
        mut speaker_rx: watch::Receiver<Option<SpeakerBinding>>,
        decision_tx: watch::Sender<Option<LockDecision>>,
        output_tx: mpsc::UnboundedSender<TranscriptionResult>,
        mut cancel: CancelToken,
    ) {
        let mut state = RaceState::new(&self.config.candidates);
        let mut poll =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let deadline = tokio::time::sleep(Duration::from_millis(self.config.lock_timeout_ms));
        tokio::pin!(deadline);

        let mut lanes_open = true;
        let mut speaker_open = true;

        let decision = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    Self::teardown(lanes).await;
                    return;
                }
                tagged = tagged_rx.recv(), if lanes_open => {
                    match tagged {
                        Some((language, mut result)) => {
                            // The lane tag is authoritative; providers may
                            // leave the hint unset.
                            result.language = language;
                            state.record(result);
                        }
                        None => lanes_open = false,
                    }
                }
                _ = poll.tick() => {
                    if let Some(winner) = state.decide(&self.config) {
                        break LockDecision {
                            language: winner.to_string(),
                            reason: LockReason::Confidence,
                        };
                    }
                }
                changed = speaker_rx.changed(), if speaker_open => {
                    if changed.is_err() {
                        speaker_open = false;
                        continue;
                    }
                    let known = speaker_rx
                        .borrow_and_update()
                        .as_ref()
                        .and_then(|binding| binding.known_language.clone());
                    if let Some(language) = known
                        && self.config.candidates.contains(&language)
                    {
                        break LockDecision {
                            language,
                            reason: LockReason::Speaker,
                        };
                    }
                }
                _ = &mut deadline => {
                    break LockDecision {
                        // Validated non-empty at config load.
                        language: self.config.candidates[0].clone(),
                        reason: LockReason::Timeout,
                    };
                }
            }
        };

        tracing::info!(
            language = %decision.language,
            reason = ?decision.reason,
            "language locked"
        );

        for lane in &lanes {
            if lane.language != decision.language {
                lane.cancel();
            }
        }

        let winner = decision.language.clone();
        let _ = decision_tx.send(Some(decision));

        // Replay the winner's race-phase history, then stream live.
        for result in state.drain_lane(&winner) {
            if output_tx.send(result).is_err() {
                Self::teardown(lanes).await;
                return;
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tagged = tagged_rx.recv() => {
                    match tagged {
                        Some((language, result)) if language == winner => {
                            if output_tx.send(result).is_err() {
                                break;
                            }
                        }
                        // Stragglers from a cancelled loser.
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }

        Self::teardown(lanes).await;
    }

    async fn teardown(lanes: Vec<LaneHandle>) {
        for lane in &lanes {
            lane.cancel();
        }
        for lane in lanes {
            lane.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockProvider, ScriptedResult};
    use crate::speaker::SpeakerId;

    struct Harness {
        decision_rx: watch::Receiver<Option<LockDecision>>,
        output_rx: mpsc::UnboundedReceiver<TranscriptionResult>,
        speaker_tx: watch::Sender<Option<SpeakerBinding>>,
        chunk_feeds: Vec<mpsc::UnboundedSender<AudioChunk>>,
        cancel: CancelHandle,
        task: JoinHandle<()>,
    }

    fn start(provider: MockProvider, config: RaceConfig) -> Harness {
        let mut feeds = Vec::new();
        let mut chunk_feeds = Vec::new();
        for language in &config.candidates {
            let (tx, rx) = mpsc::unbounded_channel();
            chunk_feeds.push(tx);
            feeds.push((language.clone(), rx));
        }

        let (lanes, tagged_rx) = spawn_lanes(Arc::new(provider), feeds);
        let (decision_tx, decision_rx) = watch::channel(None);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (speaker_tx, speaker_rx) = watch::channel(None);
        let (cancel, cancel_token) = cancel_pair();

        let coordinator = LanguageRaceCoordinator::new(config);
        let task = tokio::spawn(coordinator.run(
            lanes,
            tagged_rx,
            speaker_rx,
            decision_tx,
            output_tx,
            cancel_token,
        ));

        Harness {
            decision_rx,
            output_rx,
            speaker_tx,
            chunk_feeds,
            cancel,
            task,
        }
    }

    fn feed_all(harness: &Harness, count: u64) {
        for seq in 0..count {
            for feed in &harness.chunk_feeds {
                // A cancelled lane has already dropped its receiver.
                let _ = feed.send(AudioChunk::new(seq, vec![0; 320]));
            }
        }
    }

    async fn wait_for_decision(harness: &mut Harness) -> LockDecision {
        while harness.decision_rx.borrow().is_none() {
            harness.decision_rx.changed().await.unwrap();
        }
        harness.decision_rx.borrow().clone().unwrap()
    }

    fn two_lane_config() -> RaceConfig {
        RaceConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn confident_lane_wins_and_history_replays() {
        let provider = MockProvider::new("mock")
            .with_script(
                "en-US",
                vec![
                    ScriptedResult::new(1, TranscriptionResult::interim("hel", "en-US", 0.85)),
                    ScriptedResult::new(2, TranscriptionResult::final_result("hello", "en-US", 0.95)),
                ],
            )
            .with_script(
                "es-ES",
                vec![ScriptedResult::new(
                    2,
                    TranscriptionResult::final_result("???", "es-ES", 0.3),
                )],
            );
        let mut harness = start(provider.clone(), two_lane_config());

        feed_all(&harness, 3);
        let decision = wait_for_decision(&mut harness).await;
        assert_eq!(decision.language, "en-US");
        assert_eq!(decision.reason, LockReason::Confidence);

        // Winner history arrives in original order.
        let first = harness.output_rx.recv().await.unwrap();
        assert_eq!(first.text, "hel");
        let second = harness.output_rx.recv().await.unwrap();
        assert_eq!(second.text, "hello");

        harness.cancel.cancel();
        harness.task.await.unwrap();

        // Both lanes released their sessions by the time the task joins.
        let released = provider.released_sessions();
        assert!(released.contains(&"en-US".to_string()));
        assert!(released.contains(&"es-ES".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn winner_keeps_streaming_after_lock() {
        let provider = MockProvider::new("mock").with_script(
            "en-US",
            vec![
                ScriptedResult::new(1, TranscriptionResult::interim("on", "en-US", 0.85)),
                ScriptedResult::new(1, TranscriptionResult::final_result("one", "en-US", 0.9)),
                ScriptedResult::new(5, TranscriptionResult::final_result("two", "en-US", 0.9)),
            ],
        );
        let mut harness = start(provider, two_lane_config());

        feed_all(&harness, 2);
        let decision = wait_for_decision(&mut harness).await;
        assert_eq!(decision.language, "en-US");
        assert_eq!(harness.output_rx.recv().await.unwrap().text, "on");
        assert_eq!(harness.output_rx.recv().await.unwrap().text, "one");

        // Post-lock audio still flows through the winning lane.
        feed_all(&harness, 5);
        assert_eq!(harness.output_rx.recv().await.unwrap().text, "two");

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn known_speaker_short_circuits_the_race() {
        // No scripted results: nothing would ever lock on confidence.
        let provider = MockProvider::new("mock");
        let mut harness = start(provider, two_lane_config());
        feed_all(&harness, 1);

        harness
            .speaker_tx
            .send(Some(SpeakerBinding {
                speaker_id: SpeakerId::new("speaker-1"),
                display_name: "Speaker 1".to_string(),
                known_language: Some("es-ES".to_string()),
                provisional: false,
            }))
            .unwrap();

        let decision = wait_for_decision(&mut harness).await;
        assert_eq!(decision.language, "es-ES");
        assert_eq!(decision.reason, LockReason::Speaker);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn speaker_language_outside_candidates_is_ignored() {
        let provider = MockProvider::new("mock");
        let mut harness = start(provider, two_lane_config());
        feed_all(&harness, 1);

        harness
            .speaker_tx
            .send(Some(SpeakerBinding {
                speaker_id: SpeakerId::new("speaker-1"),
                display_name: "Speaker 1".to_string(),
                known_language: Some("ja-JP".to_string()),
                provisional: false,
            }))
            .unwrap();

        // Falls through to the hard timeout instead.
        let decision = wait_for_decision(&mut harness).await;
        assert_eq!(decision.reason, LockReason::Timeout);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back_to_first_candidate() {
        let provider = MockProvider::new("mock");
        let mut harness = start(provider, two_lane_config());
        feed_all(&harness, 1);

        let decision = wait_for_decision(&mut harness).await;
        assert_eq!(decision.language, "en-US");
        assert_eq!(decision.reason, LockReason::Timeout);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn decision_is_monotonic() {
        let provider = MockProvider::new("mock")
            .with_script(
                "en-US",
                vec![
                    ScriptedResult::new(1, TranscriptionResult::interim("hel", "en-US", 0.85)),
                    ScriptedResult::new(1, TranscriptionResult::final_result("hello", "en-US", 0.95)),
                ],
            )
            .with_script(
                "es-ES",
                vec![ScriptedResult::new(
                    4,
                    TranscriptionResult::final_result("hola perfecta", "es-ES", 0.99),
                )],
            );
        let mut harness = start(provider, two_lane_config());

        feed_all(&harness, 1);
        let decision = wait_for_decision(&mut harness).await;
        assert_eq!(decision.language, "en-US");

        // A later, even more confident result on the loser changes nothing;
        // its lane was cancelled and the decision stands.
        feed_all(&harness, 4);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            harness.decision_rx.borrow().as_ref().unwrap().language,
            "en-US"
        );

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_lock_tears_down_all_lanes() {
        let provider = MockProvider::new("mock");
        let harness = start(provider.clone(), two_lane_config());
        feed_all(&harness, 1);

        harness.cancel.cancel();
        harness.task.await.unwrap();

        let released = provider.released_sessions();
        assert!(released.contains(&"en-US".to_string()));
        assert!(released.contains(&"es-ES".to_string()));
        assert!(harness.decision_rx.borrow().is_none());
    }
}
