//! The session-scoped speaker roster.
//!
//! All read-compare-then-update sequences happen under one lock, so two
//! connections hearing the same new voice at the same instant cannot both
//! create a profile for it.

use crate::speaker::fingerprint::{VoiceFingerprint, cosine_similarity};
use crate::speaker::{SpeakerId, SpeakerProfile};
use std::collections::HashMap;
use std::sync::Mutex;

/// A ranked match against an existing profile.
#[derive(Debug, Clone)]
pub struct SpeakerMatch {
    pub speaker_id: SpeakerId,
    pub similarity: f32,
}

/// Outcome of reconciling a provisional profile with an utterance-quality
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The provisional profile matched an existing confirmed speaker and was
    /// folded into it. Callers must use `into` from now on.
    Merged { into: SpeakerId },
    /// The provisional profile was a genuinely new voice and is now
    /// confirmed under its original id.
    Promoted,
}

struct RosterInner {
    profiles: HashMap<SpeakerId, SpeakerProfile>,
    /// Ids of merged-away provisional profiles, pointing at their survivor.
    redirects: HashMap<SpeakerId, SpeakerId>,
    next_seq: u64,
}

/// Shared registry of all voices heard this session.
pub struct SpeakerRoster {
    inner: Mutex<RosterInner>,
}

impl SpeakerRoster {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RosterInner {
                profiles: HashMap::new(),
                redirects: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Fast-path binding: matches `fingerprint` against the roster and either
    /// returns the best profile at or above `threshold`, or registers a new
    /// provisional profile. The compare and the insert are atomic.
    pub fn bind_fast(
        &self,
        fingerprint: VoiceFingerprint,
        threshold: f32,
    ) -> (SpeakerProfile, bool) {
        let mut inner = self.lock();

        if let Some(best) = Self::best_match(&inner, &fingerprint) {
            if best.similarity >= threshold {
                let profile = inner.profiles[&best.speaker_id].clone();
                return (profile, false);
            }
        }

        let profile = Self::register(&mut inner, fingerprint, false);
        (profile, true)
    }

    /// Slow-path reconciliation of a provisional profile against an
    /// utterance-quality fingerprint.
    ///
    /// If another confirmed profile is at least `merge_threshold` similar,
    /// the provisional one is folded into it: the survivor absorbs the new
    /// fingerprint, learns `locked_language` if it had none, and the
    /// provisional id redirects to it. Otherwise the provisional profile is
    /// promoted in place with the better fingerprint and the language.
    pub fn confirm(
        &self,
        provisional_id: &SpeakerId,
        fingerprint: VoiceFingerprint,
        locked_language: Option<&str>,
        merge_threshold: f32,
        absorb_alpha: f32,
    ) -> ConfirmOutcome {
        let mut inner = self.lock();
        let provisional_id = Self::follow(&inner, provisional_id);

        let best = inner
            .profiles
            .iter()
            .filter(|(id, profile)| **id != provisional_id && profile.confirmed)
            .map(|(id, profile)| SpeakerMatch {
                speaker_id: id.clone(),
                similarity: cosine_similarity(&profile.fingerprint.embedding, &fingerprint.embedding),
            })
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity));

        if let Some(best) = best {
            if best.similarity >= merge_threshold {
                let survivor_id = best.speaker_id;
                if let Some(survivor) = inner.profiles.get_mut(&survivor_id) {
                    survivor.fingerprint.absorb(&fingerprint, absorb_alpha);
                    if survivor.known_language.is_none() {
                        survivor.known_language = locked_language.map(str::to_string);
                    }
                }
                inner.profiles.remove(&provisional_id);
                inner
                    .redirects
                    .insert(provisional_id, survivor_id.clone());
                return ConfirmOutcome::Merged { into: survivor_id };
            }
        }

        match inner.profiles.get_mut(&provisional_id) {
            Some(profile) => {
                profile.confirmed = true;
                profile.fingerprint = fingerprint;
                if let Some(language) = locked_language {
                    profile.known_language = Some(language.to_string());
                }
            }
            None => {
                // Profile vanished under us (e.g. merged by another
                // connection between dispatch and lock). Re-register it
                // confirmed so the utterance keeps a valid speaker.
                let mut profile = Self::register(&mut inner, fingerprint, true);
                profile.known_language = locked_language.map(str::to_string);
                let id = profile.speaker_id.clone();
                inner.profiles.insert(id.clone(), profile);
                inner.redirects.insert(provisional_id, id);
            }
        }
        ConfirmOutcome::Promoted
    }

    /// All matches for `fingerprint`, ranked by descending similarity.
    pub fn find_similar(&self, fingerprint: &VoiceFingerprint) -> Vec<SpeakerMatch> {
        let inner = self.lock();
        let mut matches: Vec<SpeakerMatch> = inner
            .profiles
            .iter()
            .map(|(id, profile)| SpeakerMatch {
                speaker_id: id.clone(),
                similarity: cosine_similarity(&profile.fingerprint.embedding, &fingerprint.embedding),
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches
    }

    /// Resolves an id through any merge redirects to the surviving profile.
    pub fn resolve(&self, id: &SpeakerId) -> SpeakerId {
        let inner = self.lock();
        Self::follow(&inner, id)
    }

    /// Updates a profile's fingerprint in place by weighted absorption.
    pub fn absorb_sample(&self, id: &SpeakerId, sample: &VoiceFingerprint, alpha: f32) {
        let mut inner = self.lock();
        let id = Self::follow(&inner, id);
        if let Some(profile) = inner.profiles.get_mut(&id) {
            profile.fingerprint.absorb(sample, alpha);
        }
    }

    /// Records the language a speaker was heard in.
    pub fn set_known_language(&self, id: &SpeakerId, language: &str) {
        let mut inner = self.lock();
        let id = Self::follow(&inner, id);
        if let Some(profile) = inner.profiles.get_mut(&id) {
            profile.known_language = Some(language.to_string());
        }
    }

    /// Snapshot of one profile, following redirects.
    pub fn profile(&self, id: &SpeakerId) -> Option<SpeakerProfile> {
        let inner = self.lock();
        let id = Self::follow(&inner, id);
        inner.profiles.get(&id).cloned()
    }

    /// Number of live (non-redirected) profiles.
    pub fn len(&self) -> usize {
        self.lock().profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RosterInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn follow(inner: &RosterInner, id: &SpeakerId) -> SpeakerId {
        let mut current = id.clone();
        // Redirect chains are short; a merged id never redirects twice to
        // the same place, so this terminates.
        while let Some(next) = inner.redirects.get(&current) {
            current = next.clone();
        }
        current
    }

    fn best_match(inner: &RosterInner, fingerprint: &VoiceFingerprint) -> Option<SpeakerMatch> {
        inner
            .profiles
            .iter()
            .map(|(id, profile)| SpeakerMatch {
                speaker_id: id.clone(),
                similarity: cosine_similarity(&profile.fingerprint.embedding, &fingerprint.embedding),
            })
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
    }

    fn register(
        inner: &mut RosterInner,
        fingerprint: VoiceFingerprint,
        confirmed: bool,
    ) -> SpeakerProfile {
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let profile = SpeakerProfile {
            speaker_id: SpeakerId::new(format!("speaker-{seq}")),
            display_name: format!("Speaker {seq}"),
            fingerprint,
            known_language: None,
            confirmed,
        };
        inner
            .profiles
            .insert(profile.speaker_id.clone(), profile.clone());
        profile
    }
}

impl Default for SpeakerRoster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(embedding: Vec<f32>) -> VoiceFingerprint {
        VoiceFingerprint::new(150.0, embedding)
    }

    #[test]
    fn bind_fast_registers_first_voice() {
        let roster = SpeakerRoster::new();
        let (profile, is_new) = roster.bind_fast(fp(vec![1.0, 0.0, 0.0]), 0.6);
        assert!(is_new);
        assert!(!profile.confirmed);
        assert_eq!(profile.speaker_id.as_str(), "speaker-1");
        assert_eq!(profile.display_name, "Speaker 1");
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn bind_fast_reuses_similar_voice() {
        let roster = SpeakerRoster::new();
        let (first, _) = roster.bind_fast(fp(vec![1.0, 0.1, 0.0]), 0.6);
        let (second, is_new) = roster.bind_fast(fp(vec![1.0, 0.05, 0.0]), 0.6);
        assert!(!is_new);
        assert_eq!(second.speaker_id, first.speaker_id);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn bind_fast_separates_dissimilar_voices() {
        let roster = SpeakerRoster::new();
        roster.bind_fast(fp(vec![1.0, 0.0, 0.0]), 0.6);
        let (second, is_new) = roster.bind_fast(fp(vec![0.0, 1.0, 0.0]), 0.6);
        assert!(is_new);
        assert_eq!(second.speaker_id.as_str(), "speaker-2");
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn confirm_promotes_new_voice() {
        let roster = SpeakerRoster::new();
        let (provisional, _) = roster.bind_fast(fp(vec![1.0, 0.0, 0.0]), 0.6);

        let outcome = roster.confirm(
            &provisional.speaker_id,
            fp(vec![0.95, 0.05, 0.0]),
            Some("en-US"),
            0.85,
            0.3,
        );
        assert_eq!(outcome, ConfirmOutcome::Promoted);

        let profile = roster.profile(&provisional.speaker_id).unwrap();
        assert!(profile.confirmed);
        assert_eq!(profile.known_language.as_deref(), Some("en-US"));
    }

    #[test]
    fn confirm_merges_into_existing_confirmed_speaker() {
        let roster = SpeakerRoster::new();
        // An already-confirmed speaker from earlier.
        let (established, _) = roster.bind_fast(fp(vec![1.0, 0.0, 0.0]), 0.6);
        roster.confirm(
            &established.speaker_id,
            fp(vec![1.0, 0.0, 0.0]),
            Some("es-ES"),
            0.85,
            0.3,
        );

        // Fast path misjudged the same voice as new (low threshold miss).
        let (provisional, is_new) = roster.bind_fast(fp(vec![0.5, 0.87, 0.0]), 0.95);
        assert!(is_new);

        // Slow path produces a fingerprint close to the established one.
        let outcome = roster.confirm(
            &provisional.speaker_id,
            fp(vec![0.99, 0.02, 0.0]),
            Some("es-ES"),
            0.85,
            0.3,
        );
        assert_eq!(
            outcome,
            ConfirmOutcome::Merged {
                into: established.speaker_id.clone()
            }
        );

        // Provisional id now redirects to the survivor.
        assert_eq!(roster.resolve(&provisional.speaker_id), established.speaker_id);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn merge_keeps_survivor_language() {
        let roster = SpeakerRoster::new();
        let (established, _) = roster.bind_fast(fp(vec![1.0, 0.0]), 0.6);
        roster.confirm(
            &established.speaker_id,
            fp(vec![1.0, 0.0]),
            Some("de-DE"),
            0.85,
            0.3,
        );

        let (provisional, _) = roster.bind_fast(fp(vec![0.0, 1.0]), 0.95);
        roster.confirm(
            &provisional.speaker_id,
            fp(vec![1.0, 0.01]),
            Some("fr-FR"),
            0.85,
            0.3,
        );

        let survivor = roster.profile(&established.speaker_id).unwrap();
        assert_eq!(survivor.known_language.as_deref(), Some("de-DE"));
    }

    #[test]
    fn find_similar_ranks_descending() {
        let roster = SpeakerRoster::new();
        roster.bind_fast(fp(vec![1.0, 0.0, 0.0]), 0.99);
        roster.bind_fast(fp(vec![0.0, 1.0, 0.0]), 0.99);
        roster.bind_fast(fp(vec![0.7, 0.7, 0.0]), 0.99);

        let matches = roster.find_similar(&fp(vec![1.0, 0.05, 0.0]));
        assert_eq!(matches.len(), 3);
        assert!(matches[0].similarity >= matches[1].similarity);
        assert!(matches[1].similarity >= matches[2].similarity);
        assert_eq!(matches[0].speaker_id.as_str(), "speaker-1");
    }

    #[test]
    fn resolve_is_identity_without_redirects() {
        let roster = SpeakerRoster::new();
        let id = SpeakerId::new("speaker-9");
        assert_eq!(roster.resolve(&id), id);
    }

    #[test]
    fn set_known_language_applies_through_redirect() {
        let roster = SpeakerRoster::new();
        let (established, _) = roster.bind_fast(fp(vec![1.0, 0.0]), 0.6);
        roster.confirm(&established.speaker_id, fp(vec![1.0, 0.0]), None, 0.85, 0.3);

        let (provisional, _) = roster.bind_fast(fp(vec![0.0, 1.0]), 0.95);
        roster.confirm(&provisional.speaker_id, fp(vec![1.0, 0.0]), None, 0.85, 0.3);

        roster.set_known_language(&provisional.speaker_id, "it-IT");
        let survivor = roster.profile(&established.speaker_id).unwrap();
        assert_eq!(survivor.known_language.as_deref(), Some("it-IT"));
    }

    #[test]
    fn concurrent_binds_of_same_voice_share_one_profile() {
        use std::sync::Arc;

        let roster = Arc::new(SpeakerRoster::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let roster = Arc::clone(&roster);
            handles.push(std::thread::spawn(move || {
                roster.bind_fast(fp(vec![1.0, 0.01, 0.0]), 0.9).0.speaker_id
            }));
        }

        let ids: Vec<SpeakerId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(roster.len(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }
}
