//! Voice fingerprints and their extraction.
//!
//! A fingerprint is a pitch estimate plus a fixed-length L2-normalized
//! embedding compared by cosine similarity. The default extractor is pure
//! DSP: log-spaced spectral band energies (Goertzel) and autocorrelation
//! pitch. A model-backed extractor can be swapped in behind the trait.

use crate::defaults;
use crate::error::{Result, VoxbridgeError};

/// Minimum audio for any extraction attempt: 100ms at 16kHz.
const MIN_SAMPLES: usize = (defaults::SAMPLE_RATE / 10) as usize;

/// A fixed-length numeric summary of a voice's acoustic identity.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceFingerprint {
    /// Fundamental frequency estimate in Hz.
    pub pitch_hz: f32,
    /// L2-normalized embedding vector.
    pub embedding: Vec<f32>,
}

impl VoiceFingerprint {
    /// Creates a fingerprint, normalizing the embedding.
    pub fn new(pitch_hz: f32, embedding: Vec<f32>) -> Self {
        Self {
            pitch_hz,
            embedding: l2_normalize(embedding),
        }
    }

    /// Absorbs a new sample of the same voice via weighted average:
    /// `old * (1 - alpha) + new * alpha`, renormalized. This is the only
    /// sanctioned mutation of a finalized fingerprint.
    pub fn absorb(&mut self, sample: &VoiceFingerprint, alpha: f32) {
        if self.embedding.len() != sample.embedding.len() {
            // Dimension mismatch means different extractors; keep ours.
            return;
        }
        for (ours, theirs) in self.embedding.iter_mut().zip(&sample.embedding) {
            *ours = *ours * (1.0 - alpha) + theirs * alpha;
        }
        self.embedding = l2_normalize(std::mem::take(&mut self.embedding));
        self.pitch_hz = self.pitch_hz * (1.0 - alpha) + sample.pitch_hz * alpha;
    }
}

/// Cosine similarity of two embeddings. Returns 0.0 on dimension mismatch
/// or zero vectors; otherwise bounded in [-1, 1] and symmetric.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Turns an audio buffer into a voice fingerprint.
pub trait FingerprintExtractor: Send + Sync {
    /// Extracts a fingerprint from 16kHz mono PCM samples.
    ///
    /// Fails if the buffer is too short to characterize a voice.
    fn extract(&self, samples: &[i16]) -> Result<VoiceFingerprint>;

    /// Extractor name for logs.
    fn name(&self) -> &'static str;
}

/// Default DSP extractor: Goertzel band energies + autocorrelation pitch.
pub struct SpectralFingerprintExtractor {
    bands: usize,
}

impl SpectralFingerprintExtractor {
    pub fn new() -> Self {
        Self {
            bands: defaults::EMBEDDING_BANDS,
        }
    }

    /// Log-spaced band center frequencies between 100Hz and 4kHz.
    fn band_centers(&self) -> Vec<f32> {
        let lo: f32 = 100.0;
        let hi: f32 = 4000.0;
        let ratio = (hi / lo).ln();
        (0..self.bands)
            .map(|i| lo * (ratio * i as f32 / (self.bands - 1) as f32).exp())
            .collect()
    }

    /// Goertzel power at one frequency, normalized by buffer length.
    fn goertzel_power(samples: &[f32], freq: f32) -> f32 {
        let coeff = 2.0 * (2.0 * std::f32::consts::PI * freq / defaults::SAMPLE_RATE as f32).cos();
        let mut s_prev = 0.0f32;
        let mut s_prev2 = 0.0f32;
        for &x in samples {
            let s = x + coeff * s_prev - s_prev2;
            s_prev2 = s_prev;
            s_prev = s;
        }
        let power = s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2;
        power / samples.len() as f32
    }

    /// Autocorrelation pitch over the configured search range.
    fn estimate_pitch(samples: &[f32]) -> f32 {
        let sr = defaults::SAMPLE_RATE as f32;
        let min_lag = (sr / defaults::PITCH_MAX_HZ) as usize;
        let max_lag = (sr / defaults::PITCH_MIN_HZ) as usize;
        if samples.len() <= max_lag * 2 {
            return 0.0;
        }

        let energy: f32 = samples.iter().map(|x| x * x).sum();
        if energy == 0.0 {
            return 0.0;
        }

        let mut best_lag = 0;
        let mut best_corr = 0.0f32;
        for lag in min_lag..=max_lag {
            let corr: f32 = samples[..samples.len() - lag]
                .iter()
                .zip(&samples[lag..])
                .map(|(a, b)| a * b)
                .sum();
            let corr = corr / energy;
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }

        if best_lag == 0 { 0.0 } else { sr / best_lag as f32 }
    }
}

impl Default for SpectralFingerprintExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintExtractor for SpectralFingerprintExtractor {
    fn extract(&self, samples: &[i16]) -> Result<VoiceFingerprint> {
        if samples.len() < MIN_SAMPLES {
            return Err(VoxbridgeError::Fingerprint {
                message: format!(
                    "need at least {} samples, got {}",
                    MIN_SAMPLES,
                    samples.len()
                ),
            });
        }

        let normalized: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();

        let embedding: Vec<f32> = self
            .band_centers()
            .iter()
            .map(|&freq| (1.0 + Self::goertzel_power(&normalized, freq)).ln())
            .collect();

        let pitch = Self::estimate_pitch(&normalized);
        Ok(VoiceFingerprint::new(pitch, embedding))
    }

    fn name(&self) -> &'static str {
        "spectral"
    }
}
