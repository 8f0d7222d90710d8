//! Per-connection speaker identification.
//!
//! Buffers decoded audio as it arrives. Once enough has accumulated, a fast
//! low-quality fingerprint binds the connection to a roster profile and the
//! binding is published on a watch channel (the race coordinator subscribes
//! for its known-language short-circuit). At each utterance boundary a
//! fingerprint over the full utterance reconciles that early guess.

use crate::config::SpeakerConfig;
use crate::defaults;
use crate::error::Result;
use crate::speaker::fingerprint::FingerprintExtractor;
use crate::speaker::roster::{ConfirmOutcome, SpeakerRoster};
use crate::speaker::SpeakerId;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// The speaker a connection is currently attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerBinding {
    pub speaker_id: SpeakerId,
    pub display_name: String,
    /// Language this speaker was previously heard in. Present only for
    /// confirmed roster profiles.
    pub known_language: Option<String>,
    /// True until the slow path has reconciled the binding.
    pub provisional: bool,
}

struct AudioBuffer {
    /// Rolling window of decoded samples, capped at
    /// [`defaults::MAX_UTTERANCE_AUDIO_MS`] so a connection that never
    /// commits an utterance cannot grow it without bound.
    samples: Vec<i16>,
    /// Samples consumed by the fast path; the utterance fingerprint still
    /// covers them.
    bound: bool,
}

/// Two-speed speaker identity for one connection.
pub struct SpeakerIdentifier {
    roster: Arc<SpeakerRoster>,
    extractor: Arc<dyn FingerprintExtractor>,
    config: SpeakerConfig,
    buffer: Mutex<AudioBuffer>,
    binding_tx: watch::Sender<Option<SpeakerBinding>>,
    binding_rx: watch::Receiver<Option<SpeakerBinding>>,
}

impl SpeakerIdentifier {
    pub fn new(
        roster: Arc<SpeakerRoster>,
        extractor: Arc<dyn FingerprintExtractor>,
        config: SpeakerConfig,
    ) -> Self {
        let (binding_tx, binding_rx) = watch::channel(None);
        Self {
            roster,
            extractor,
            config,
            buffer: Mutex::new(AudioBuffer {
                samples: Vec::new(),
                bound: false,
            }),
            binding_tx,
            binding_rx,
        }
    }

    /// Feeds decoded samples into the utterance buffer and, once enough
    /// audio exists for an unbound connection, runs the fast path. Returns
    /// the new binding when one was just published.
    pub fn ingest_samples(&self, samples: &[i16]) -> Result<Option<SpeakerBinding>> {
        let fingerprint = {
            let mut buffer = self.lock_buffer();
            buffer.samples.extend_from_slice(samples);

            let cap = Self::max_buffer_samples();
            if buffer.samples.len() > cap {
                let excess = buffer.samples.len() - cap;
                buffer.samples.drain(..excess);
            }

            if buffer.bound || buffer.samples.len() < self.min_fast_samples() {
                return Ok(None);
            }
            let fingerprint = self.extractor.extract(&buffer.samples)?;
            buffer.bound = true;
            fingerprint
        };

        let (profile, is_new) = self
            .roster
            .bind_fast(fingerprint, self.config.provisional_similarity_threshold);

        tracing::debug!(
            speaker = %profile.speaker_id,
            new = is_new,
            confirmed = profile.confirmed,
            "fast-path speaker binding"
        );

        let binding = SpeakerBinding {
            speaker_id: profile.speaker_id,
            display_name: profile.display_name,
            known_language: if profile.confirmed {
                profile.known_language
            } else {
                None
            },
            provisional: !profile.confirmed,
        };
        let _ = self.binding_tx.send(Some(binding.clone()));
        Ok(Some(binding))
    }

    /// Drains the buffered utterance audio at a boundary. The fast-path flag
    /// resets so the next utterance re-evaluates identity.
    pub fn take_utterance_audio(&self) -> Vec<i16> {
        let mut buffer = self.lock_buffer();
        buffer.bound = false;
        std::mem::take(&mut buffer.samples)
    }

    /// Slow path: fingerprints a whole committed utterance and reconciles
    /// the provisional binding against the roster. Returns the binding the
    /// utterance should be attributed to.
    pub fn confirm_utterance(
        &self,
        samples: &[i16],
        locked_language: Option<&str>,
    ) -> Result<Option<SpeakerBinding>> {
        let Some(current) = self.current_binding() else {
            return Ok(None);
        };

        let fingerprint = self.extractor.extract(samples)?;

        if current.provisional {
            let outcome = self.roster.confirm(
                &current.speaker_id,
                fingerprint,
                locked_language,
                self.config.merge_similarity_threshold,
                defaults::FINGERPRINT_ALPHA,
            );
            if let ConfirmOutcome::Merged { into } = &outcome {
                tracing::info!(
                    provisional = %current.speaker_id,
                    merged_into = %into,
                    "provisional speaker merged"
                );
            }
        } else {
            // Already confirmed: keep the profile converging on the voice.
            self.roster.absorb_sample(
                &current.speaker_id,
                &fingerprint,
                defaults::FINGERPRINT_ALPHA,
            );
            if let Some(language) = locked_language {
                self.roster.set_known_language(&current.speaker_id, language);
            }
        }

        let resolved = self.roster.resolve(&current.speaker_id);
        let binding = self
            .roster
            .profile(&resolved)
            .map(|profile| SpeakerBinding {
                speaker_id: profile.speaker_id,
                display_name: profile.display_name,
                known_language: profile.known_language,
                provisional: !profile.confirmed,
            });

        if binding != Some(current) {
            let _ = self.binding_tx.send(binding.clone());
        }
        Ok(binding)
    }

    /// Subscribes to binding changes.
    pub fn binding_watch(&self) -> watch::Receiver<Option<SpeakerBinding>> {
        self.binding_rx.clone()
    }

    /// The current binding, if the fast path has run.
    pub fn current_binding(&self) -> Option<SpeakerBinding> {
        self.binding_rx.borrow().clone()
    }

    fn min_fast_samples(&self) -> usize {
        (defaults::SAMPLE_RATE as u64 * self.config.min_fast_audio_ms / 1000) as usize
    }

    fn max_buffer_samples() -> usize {
        (defaults::SAMPLE_RATE as u64 * defaults::MAX_UTTERANCE_AUDIO_MS / 1000) as usize
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, AudioBuffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}
