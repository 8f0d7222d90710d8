//! Lane standings for the language race.

use crate::config::RaceConfig;
use crate::defaults;
use crate::types::TranscriptionResult;

/// One lane's buffered results and score.
#[derive(Debug)]
pub struct LaneState {
    language: String,
    results: Vec<TranscriptionResult>,
}

impl LaneState {
    fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            results: Vec::new(),
        }
    }

    /// Running confidence: the mean over all buffered results, with interim
    /// results down-weighted since the recognizer may still revise them.
    pub fn running_confidence(&self) -> f32 {
        if self.results.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .results
            .iter()
            .map(|r| {
                if r.is_final {
                    r.confidence
                } else {
                    r.confidence * defaults::INTERIM_CONFIDENCE_WEIGHT
                }
            })
            .sum();
        sum / self.results.len() as f32
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

/// Standings across all lanes, in candidate priority order.
#[derive(Debug)]
pub struct RaceState {
    lanes: Vec<LaneState>,
}

impl RaceState {
    pub fn new(candidates: &[String]) -> Self {
        Self {
            lanes: candidates.iter().map(|c| LaneState::new(c)).collect(),
        }
    }

    /// Buffers one result under its lane. Results for unknown languages are
    /// ignored; sentinels score zero confidence but still count, since a
    /// failing lane should not look promising.
    pub fn record(&mut self, result: TranscriptionResult) {
        if let Some(lane) = self
            .lanes
            .iter_mut()
            .find(|lane| lane.language == result.language)
        {
            lane.results.push(result);
        }
    }

    /// Evaluates the lock conditions. Only lanes with at least two results
    /// compete; among those, the winning language is the one that clears the
    /// confidence threshold and is decisively ahead of the runner-up, either
    /// by confidence gap or by result-count lead.
    pub fn decide(&self, config: &RaceConfig) -> Option<&str> {
        let mut standings: Vec<&LaneState> = self
            .lanes
            .iter()
            .filter(|lane| lane.result_count() >= defaults::MIN_LOCK_RESULTS)
            .collect();
        standings.sort_by(|a, b| b.running_confidence().total_cmp(&a.running_confidence()));

        let leader = standings.first()?;
        if leader.running_confidence() < config.confidence_threshold {
            return None;
        }

        let decisive = match standings.get(1) {
            Some(runner_up) => {
                leader.running_confidence() - runner_up.running_confidence()
                    >= config.confidence_gap
                    || leader.result_count() > runner_up.result_count() + config.result_count_lead
            }
            // No eligible rival: the lane locks as soon as it clears the bar.
            None => true,
        };

        decisive.then(|| leader.language())
    }

    /// Drains the buffered results for `language`, in arrival order. Used to
    /// replay the winner's history into the transcript after lock.
    pub fn drain_lane(&mut self, language: &str) -> Vec<TranscriptionResult> {
        self.lanes
            .iter_mut()
            .find(|lane| lane.language == language)
            .map(|lane| std::mem::take(&mut lane.results))
            .unwrap_or_default()
    }

    pub fn lane(&self, language: &str) -> Option<&LaneState> {
        self.lanes.iter().find(|lane| lane.language == language)
    }
}
