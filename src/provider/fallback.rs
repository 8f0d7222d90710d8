//! Priority-ordered provider fallback for the single-shot path.
//!
//! Tries each provider in turn until one succeeds. A provider failure here
//! is always transient: the error only surfaces if every provider fails,
//! and then it is the last one seen.

use crate::error::{Result, VoxbridgeError};
use crate::provider::TranscriptionProvider;
use crate::types::TranscriptionResult;
use std::sync::Arc;

/// Single-shot transcription across multiple providers in priority order.
pub struct FallbackChain {
    providers: Vec<Arc<dyn TranscriptionProvider>>,
    name: String,
}

impl FallbackChain {
    /// Creates a chain from providers in priority order.
    ///
    /// # Panics
    /// Panics if `providers` is empty.
    pub fn new(providers: Vec<Arc<dyn TranscriptionProvider>>) -> Self {
        assert!(!providers.is_empty(), "need at least one provider");
        let name = providers
            .iter()
            .map(|p| p.name().to_string())
            .collect::<Vec<_>>()
            .join("+");
        Self { providers, name }
    }

    /// Recognizes `audio` with the first provider that succeeds.
    pub async fn transcribe_once(
        &self,
        audio: &[u8],
        language_hint: &str,
    ) -> Result<TranscriptionResult> {
        let mut last_err: Option<VoxbridgeError> = None;

        for provider in &self.providers {
            match provider.transcribe_once(audio, language_hint).await {
                Ok(result) => {
                    if last_err.is_some() {
                        tracing::info!(
                            provider = provider.name(),
                            "fallback provider succeeded"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "provider failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| VoxbridgeError::Provider {
            provider: self.name.clone(),
            message: "no provider produced a result".to_string(),
        }))
    }

    /// Joined provider names, in priority order.
    pub fn name(&self) -> &str {
        &self.name
    }
}
