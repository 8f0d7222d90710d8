//! HTTP-backed transcription provider.
//!
//! Talks to a remote recognition service: opens a session per stream, posts
//! buffered audio spans, and forwards whatever interim/final results the
//! service returns. The session is DELETEd on cancel and on stream end, so
//! the remote side can free its decoder promptly.

use crate::cancel::CancelToken;
use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use crate::provider::TranscriptionProvider;
use crate::types::{AudioChunk, TranscriptionResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for the remote recognition backend.
#[derive(Debug, Clone)]
pub struct RemoteAsrConfig {
    /// Service endpoint, e.g. `http://127.0.0.1:5920`.
    pub endpoint: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// How much audio to buffer before posting a span, in milliseconds.
    pub flush_ms: u64,
}

impl Default for RemoteAsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5920".to_string(),
            timeout_ms: 5000,
            flush_ms: defaults::REMOTE_FLUSH_MS,
        }
    }
}

/// Wire format of one result row from the service.
#[derive(Debug, Deserialize)]
struct WireResult {
    text: String,
    #[serde(rename = "final")]
    is_final: bool,
    confidence: f32,
    #[serde(default)]
    offset_ms: u64,
    #[serde(default)]
    duration_ms: u64,
}

impl WireResult {
    fn into_result(self, language: &str) -> TranscriptionResult {
        TranscriptionResult {
            text: self.text,
            language: language.to_string(),
            is_final: self.is_final,
            confidence: self.confidence.clamp(0.0, 1.0),
            offset: Duration::from_millis(self.offset_ms),
            duration: Duration::from_millis(self.duration_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SpanResponse {
    #[serde(default)]
    results: Vec<WireResult>,
}

/// Streaming provider backed by an HTTP recognition service.
pub struct RemoteAsrProvider {
    client: reqwest::Client,
    config: RemoteAsrConfig,
    name: String,
}

impl RemoteAsrProvider {
    pub fn new(config: RemoteAsrConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(VoxbridgeError::Http)?;
        Ok(Self {
            client,
            config,
            name: "remote-asr".to_string(),
        })
    }

    fn session_url(&self) -> String {
        format!("{}/v1/sessions", self.config.endpoint)
    }

    fn audio_url(&self, session_id: &str) -> String {
        format!("{}/v1/sessions/{}/audio", self.config.endpoint, session_id)
    }

    fn release_url(&self, session_id: &str) -> String {
        format!("{}/v1/sessions/{}", self.config.endpoint, session_id)
    }

    async fn open_session(&self, language_hint: &str) -> Result<String> {
        let response = self
            .client
            .post(self.session_url())
            .json(&serde_json::json!({ "language": language_hint }))
            .send()
            .await?
            .error_for_status()?;
        let session: SessionResponse = response.json().await?;
        Ok(session.session_id)
    }

    /// Posts one buffered span and returns the service's results.
    async fn post_span(
        &self,
        session_id: &str,
        audio: &[u8],
        finalize: bool,
    ) -> Result<Vec<WireResult>> {
        let response = self
            .client
            .post(self.audio_url(session_id))
            .query(&[("finalize", finalize.to_string())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await?
            .error_for_status()?;
        let span: SpanResponse = response.json().await?;
        Ok(span.results)
    }

    /// Releases the remote session. Best-effort: the stream is already over
    /// or cancelled by the time this runs.
    async fn release_session(&self, session_id: &str) {
        if let Err(e) = self.client.delete(self.release_url(session_id)).send().await {
            tracing::warn!(session = session_id, error = %e, "failed to release remote session");
        }
    }

    fn flush_bytes(&self) -> usize {
        // 16-bit mono PCM.
        (defaults::SAMPLE_RATE as u64 * 2 * self.config.flush_ms / 1000) as usize
    }
}

#[async_trait]
impl TranscriptionProvider for RemoteAsrProvider {
    async fn transcribe(
        &self,
        mut chunks: mpsc::UnboundedReceiver<AudioChunk>,
        language_hint: &str,
        mut cancel: CancelToken,
        results: mpsc::UnboundedSender<TranscriptionResult>,
    ) {
        let session_id = match self.open_session(language_hint).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(language = language_hint, error = %e, "failed to open remote session");
                let _ = results.send(TranscriptionResult::sentinel(language_hint));
                return;
            }
        };

        let flush_bytes = self.flush_bytes();
        let mut buffer: Vec<u8> = Vec::with_capacity(flush_bytes);
        let mut degraded = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = chunks.recv() => {
                    let Some(chunk) = chunk else {
                        // Stream end: flush whatever is left as the final span.
                        if !buffer.is_empty() {
                            match self.post_span(&session_id, &buffer, true).await {
                                Ok(rows) => {
                                    for row in rows {
                                        let _ = results.send(row.into_result(language_hint));
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(session = %session_id, error = %e, "final span failed");
                                    degraded = true;
                                }
                            }
                        }
                        break;
                    };

                    buffer.extend_from_slice(&chunk.payload);
                    if buffer.len() < flush_bytes {
                        continue;
                    }

                    match self.post_span(&session_id, &buffer, false).await {
                        Ok(rows) => {
                            buffer.clear();
                            for row in rows {
                                if results.send(row.into_result(language_hint)).is_err() {
                                    // Receiver gone; stop posting audio.
                                    self.release_session(&session_id).await;
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(session = %session_id, error = %e, "span post failed");
                            degraded = true;
                            break;
                        }
                    }
                }
            }
        }

        if degraded {
            let _ = results.send(TranscriptionResult::sentinel(language_hint));
        }
        self.release_session(&session_id).await;
    }

    async fn transcribe_once(
        &self,
        audio: &[u8],
        language_hint: &str,
    ) -> Result<TranscriptionResult> {
        let response = self
            .client
            .post(format!("{}/v1/transcribe", self.config.endpoint))
            .query(&[("language", language_hint)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await?
            .error_for_status()?;

        let row: WireResult = response.json().await?;
        Ok(row.into_result(language_hint))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
