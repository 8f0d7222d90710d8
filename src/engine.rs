//! The multi-connection ingestion engine.
//!
//! Owns the speaker roster shared by every connection, a pipeline per live
//! connection, and one scanner task that fires utterance boundaries across
//! all of them on a fixed tick.

use crate::config::Config;
use crate::error::{Result, VoxbridgeError};
use crate::events::EventSink;
use crate::pipeline::ConnectionPipeline;
use crate::provider::TranscriptionProvider;
use crate::segmenter::{Clock, SystemClock};
use crate::speaker::fingerprint::{FingerprintExtractor, SpectralFingerprintExtractor};
use crate::speaker::roster::SpeakerRoster;
use crate::types::{ChunkMeta, ConnectionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Entry point for transports: connections in, events out.
pub struct Engine {
    config: Config,
    provider: Arc<dyn TranscriptionProvider>,
    sink: Arc<dyn EventSink>,
    roster: Arc<SpeakerRoster>,
    extractor: Arc<dyn FingerprintExtractor>,
    clock: Arc<dyn Clock>,
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionPipeline>>>,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Creates the engine and starts its boundary scanner.
    pub fn new(
        config: Config,
        provider: Arc<dyn TranscriptionProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Self::with_extractor(
            config,
            provider,
            sink,
            Arc::new(SpectralFingerprintExtractor::new()),
        )
    }

    /// Like [`Engine::new`] with a custom fingerprint extractor.
    pub fn with_extractor(
        config: Config,
        provider: Arc<dyn TranscriptionProvider>,
        sink: Arc<dyn EventSink>,
        extractor: Arc<dyn FingerprintExtractor>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            scanner: Mutex::new(None),
            roster: Arc::new(SpeakerRoster::new()),
            clock: Arc::new(SystemClock),
            connections: Mutex::new(HashMap::new()),
            config,
            provider,
            sink,
            extractor,
        });

        let scanner = tokio::spawn(Self::scan_loop(
            Arc::downgrade(&engine),
            engine.config.segmenter.scan_tick_ms,
        ));
        *engine.scanner.lock().unwrap_or_else(|e| e.into_inner()) = Some(scanner);
        engine
    }

    /// Opens a new connection and starts its pipeline.
    pub fn connect(&self, connection_id: ConnectionId) -> Result<()> {
        let mut connections = self.lock_connections();
        if connections.contains_key(&connection_id) {
            return Err(VoxbridgeError::DuplicateConnection {
                id: connection_id.to_string(),
            });
        }

        let pipeline = ConnectionPipeline::spawn(
            connection_id.clone(),
            &self.config,
            Arc::clone(&self.provider),
            Arc::clone(&self.roster),
            Arc::clone(&self.extractor),
            Arc::clone(&self.sink),
            Arc::clone(&self.clock),
        );
        tracing::info!(connection = %connection_id, "connection opened");
        connections.insert(connection_id, pipeline);
        Ok(())
    }

    /// Routes one chunk to its connection's pipeline.
    pub fn submit_chunk(&self, connection_id: &ConnectionId, meta: ChunkMeta) -> Result<()> {
        let pipeline = self.pipeline(connection_id)?;
        pipeline.submit_chunk(meta)
    }

    /// Marks the inbound stream finished. The connection stays open so
    /// in-flight results can still commit via the scanner.
    pub fn finish_stream(&self, connection_id: &ConnectionId) -> Result<()> {
        let pipeline = self.pipeline(connection_id)?;
        pipeline.finish();
        Ok(())
    }

    /// Tears a connection down: drains what can be drained, commits any
    /// pending utterance, and emits the closed event.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Result<()> {
        let pipeline = self
            .lock_connections()
            .remove(connection_id)
            .ok_or_else(|| VoxbridgeError::ConnectionNotFound {
                id: connection_id.to_string(),
            })?;

        // A locked connection drains its tail so finals in flight land in
        // the transcript; an unlocked one has nothing worth waiting for.
        let graceful = pipeline.is_locked();
        pipeline.shutdown(graceful).await;
        pipeline.flush();

        self.sink.on_connection_closed(connection_id);
        tracing::info!(
            connection = %connection_id,
            uptime = %humantime::format_duration(pipeline.uptime()),
            "connection closed"
        );
        Ok(())
    }

    /// Disconnects every connection and stops the scanner.
    pub async fn shutdown(&self) {
        let ids: Vec<ConnectionId> = self.lock_connections().keys().cloned().collect();
        for id in ids {
            let _ = self.disconnect(&id).await;
        }

        let scanner = self.scanner.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(scanner) = scanner {
            scanner.abort();
            let _ = scanner.await;
        }
    }

    /// The shared speaker roster.
    pub fn roster(&self) -> &Arc<SpeakerRoster> {
        &self.roster
    }

    pub fn connection_count(&self) -> usize {
        self.lock_connections().len()
    }

    async fn scan_loop(engine: Weak<Engine>, tick_ms: u64) {
        let mut tick = tokio::time::interval(Duration::from_millis(tick_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            let Some(engine) = engine.upgrade() else {
                return;
            };

            let pipelines: Vec<Arc<ConnectionPipeline>> =
                engine.lock_connections().values().cloned().collect();
            let now = engine.clock.now();
            for pipeline in pipelines {
                pipeline.scan(now);
            }
        }
    }

    fn pipeline(&self, connection_id: &ConnectionId) -> Result<Arc<ConnectionPipeline>> {
        self.lock_connections()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| VoxbridgeError::ConnectionNotFound {
                id: connection_id.to_string(),
            })
    }

    fn lock_connections(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Arc<ConnectionPipeline>>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }
}
