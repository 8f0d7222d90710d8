//! Transcription provider abstraction.
//!
//! Several recognition backends sit behind one capability: stream chunks in,
//! stream interim/final results out. The race coordinator runs one
//! `transcribe` call per candidate language; the single-shot path goes
//! through [`fallback::FallbackChain`].

pub mod fallback;
pub mod remote;

use crate::cancel::CancelToken;
use crate::error::{Result, VoxbridgeError};
use crate::types::{AudioChunk, TranscriptionResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capability contract for one recognition backend.
///
/// Streaming semantics:
/// - emit interim results promptly and one-or-more finals per committed span;
/// - on cancellation, stop emitting promptly and release any upstream session;
/// - on failure, degrade to a [`TranscriptionResult::sentinel`] final instead
///   of raising — callers filter the sentinel out of the transcript.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Consumes `chunks` until stream end or cancellation, sending results
    /// to `results`. Returns when the session is fully released.
    async fn transcribe(
        &self,
        chunks: mpsc::UnboundedReceiver<AudioChunk>,
        language_hint: &str,
        cancel: CancelToken,
        results: mpsc::UnboundedSender<TranscriptionResult>,
    );

    /// Recognizes one complete audio buffer. Unlike the streaming path this
    /// returns an error on failure, so a caller can try the next provider.
    async fn transcribe_once(
        &self,
        audio: &[u8],
        language_hint: &str,
    ) -> Result<TranscriptionResult>;

    /// Provider name for logs and error messages.
    fn name(&self) -> &str;
}

/// One scripted emission for [`MockProvider`]: fires after the provider has
/// consumed `after_chunk` chunks.
#[derive(Debug, Clone)]
pub struct ScriptedResult {
    pub after_chunk: u64,
    pub result: TranscriptionResult,
    /// Artificial recognition latency before the result is emitted.
    pub delay: Duration,
}

impl ScriptedResult {
    pub fn new(after_chunk: u64, result: TranscriptionResult) -> Self {
        Self {
            after_chunk,
            result,
            delay: Duration::ZERO,
        }
    }
}

/// Mock provider for tests: emits a per-language script as chunks arrive and
/// records every released session so cancellation behavior can be asserted.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    scripts: Arc<HashMap<String, Vec<ScriptedResult>>>,
    fail_streaming: bool,
    once_response: Option<TranscriptionResult>,
    released: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scripts: Arc::new(HashMap::new()),
            fail_streaming: false,
            once_response: None,
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a result script for one language hint.
    pub fn with_script(mut self, language: &str, script: Vec<ScriptedResult>) -> Self {
        let mut scripts = HashMap::clone(&self.scripts);
        scripts.insert(language.to_string(), script);
        self.scripts = Arc::new(scripts);
        self
    }

    /// Makes the streaming path degrade to a sentinel on the first chunk.
    pub fn with_streaming_failure(mut self) -> Self {
        self.fail_streaming = true;
        self
    }

    /// Configures the single-shot response. Without one, `transcribe_once`
    /// fails, which is how fallback tests simulate a broken provider.
    pub fn with_once_response(mut self, result: TranscriptionResult) -> Self {
        self.once_response = Some(result);
        self
    }

    /// Language hints whose streaming sessions have been released, in
    /// release order. A session is released on cancel and on stream end.
    pub fn released_sessions(&self) -> Vec<String> {
        self.released.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn release(&self, language: &str) {
        self.released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(language.to_string());
    }
}

#[async_trait]
impl TranscriptionProvider for MockProvider {
    async fn transcribe(
        &self,
        mut chunks: mpsc::UnboundedReceiver<AudioChunk>,
        language_hint: &str,
        mut cancel: CancelToken,
        results: mpsc::UnboundedSender<TranscriptionResult>,
    ) {
        let script = self
            .scripts
            .get(language_hint)
            .cloned()
            .unwrap_or_default();
        let mut consumed: u64 = 0;
        let mut emitted = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = chunks.recv() => {
                    let Some(_chunk) = chunk else { break };
                    consumed += 1;

                    if self.fail_streaming {
                        let _ = results.send(TranscriptionResult::sentinel(language_hint));
                        break;
                    }

                    while emitted < script.len() && script[emitted].after_chunk <= consumed {
                        let scripted = &script[emitted];
                        if !scripted.delay.is_zero() {
                            tokio::time::sleep(scripted.delay).await;
                        }
                        if results.send(scripted.result.clone()).is_err() {
                            break;
                        }
                        emitted += 1;
                    }
                }
            }
        }

        self.release(language_hint);
    }

    async fn transcribe_once(
        &self,
        _audio: &[u8],
        language_hint: &str,
    ) -> Result<TranscriptionResult> {
        match &self.once_response {
            Some(result) => Ok(result.clone()),
            None => Err(VoxbridgeError::Provider {
                provider: self.name.clone(),
                message: format!("mock failure for '{}'", language_hint),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: u64) -> mpsc::UnboundedReceiver<AudioChunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        for seq in 0..chunks {
            tx.send(AudioChunk::new(seq, vec![0; 4])).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn mock_emits_script_in_order() {
        let provider = MockProvider::new("mock").with_script(
            "en-US",
            vec![
                ScriptedResult::new(1, TranscriptionResult::interim("hel", "en-US", 0.4)),
                ScriptedResult::new(2, TranscriptionResult::final_result("hello", "en-US", 0.9)),
            ],
        );

        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        provider
            .transcribe(feed(3), "en-US", CancelToken::never(), results_tx)
            .await;

        let first = results_rx.recv().await.unwrap();
        assert!(!first.is_final);
        assert_eq!(first.text, "hel");

        let second = results_rx.recv().await.unwrap();
        assert!(second.is_final);
        assert_eq!(second.text, "hello");
    }

    #[tokio::test]
    async fn mock_releases_session_on_stream_end() {
        let provider = MockProvider::new("mock");
        let (results_tx, _results_rx) = mpsc::unbounded_channel();
        provider
            .transcribe(feed(1), "es-ES", CancelToken::never(), results_tx)
            .await;
        assert_eq!(provider.released_sessions(), vec!["es-ES".to_string()]);
    }

    #[tokio::test]
    async fn mock_releases_session_on_cancel() {
        let provider = MockProvider::new("mock");
        let (cancel_handle, cancel) = crate::cancel::cancel_pair();
        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let (results_tx, _results_rx) = mpsc::unbounded_channel();

        let task = {
            let provider = provider.clone();
            tokio::spawn(async move {
                provider.transcribe(chunks_rx, "en-US", cancel, results_tx).await;
            })
        };

        cancel_handle.cancel();
        task.await.unwrap();
        drop(chunks_tx);
        assert_eq!(provider.released_sessions(), vec!["en-US".to_string()]);
    }

    #[tokio::test]
    async fn failing_mock_degrades_to_sentinel() {
        let provider = MockProvider::new("mock").with_streaming_failure();
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        provider
            .transcribe(feed(2), "en-US", CancelToken::never(), results_tx)
            .await;

        let only = results_rx.recv().await.unwrap();
        assert!(only.is_sentinel());
        assert!(results_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn transcribe_once_uses_configured_response() {
        let provider = MockProvider::new("mock")
            .with_once_response(TranscriptionResult::final_result("hi", "en-US", 0.8));
        let result = provider.transcribe_once(&[0u8; 8], "en-US").await.unwrap();
        assert_eq!(result.text, "hi");
    }

    #[tokio::test]
    async fn transcribe_once_fails_without_response() {
        let provider = MockProvider::new("mock");
        let err = provider.transcribe_once(&[0u8; 8], "en-US").await.unwrap_err();
        assert!(err.to_string().contains("mock"));
    }
}
