//! Chunk fan-out to independent consumers.
//!
//! One inbound stream feeds several racing transcription lanes plus the
//! speaker path. Each consumer owns an unbounded queue, so a slow consumer
//! never backs up `submit` or starves the others; stream end closes every
//! queue so downstream loops terminate on their own.

use crate::types::AudioChunk;
use tokio::sync::mpsc;

/// Fans one chunk stream out to N independent consumer queues.
pub struct AudioBroadcaster {
    consumers: Vec<NamedConsumer>,
    finished: bool,
}

struct NamedConsumer {
    name: String,
    tx: mpsc::UnboundedSender<AudioChunk>,
}

impl AudioBroadcaster {
    /// Creates a broadcaster with no consumers.
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
            finished: false,
        }
    }

    /// Registers a consumer and returns its queue.
    ///
    /// The name shows up in logs when a consumer falls away mid-stream.
    pub fn register(&mut self, name: &str) -> mpsc::UnboundedReceiver<AudioChunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers.push(NamedConsumer {
            name: name.to_string(),
            tx,
        });
        rx
    }

    /// Forwards the chunk reference to every registered consumer.
    ///
    /// Never blocks: the queues are unbounded and a consumer that dropped
    /// its receiver is silently unregistered.
    pub fn submit(&mut self, chunk: AudioChunk) {
        self.consumers.retain(|consumer| {
            if consumer.tx.send(chunk.clone()).is_err() {
                tracing::debug!(consumer = %consumer.name, "consumer gone, unregistering");
                false
            } else {
                true
            }
        });
    }

    /// Signals end of stream by closing every consumer queue.
    pub fn finish(&mut self) {
        self.finished = true;
        self.consumers.clear();
    }

    /// Returns true after `finish` was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of consumers still attached.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

impl Default for AudioBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
