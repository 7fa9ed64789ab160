mod batch_writer;
mod registry;
mod ring;

pub use batch_writer::LogSink;
pub use registry::LogPipelineRegistry;

use std::sync::Arc;
use std::time::Duration;

use dockhand_common::{DeploymentId, LogEntry, LogLevel};
use tokio::sync::mpsc;

use batch_writer::BatchWriter;
use ring::RingBuffer;

/// How long a stream waits for a new entry before emitting a keep-alive
/// (§4.1 "Streaming contract").
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How often the background ticker checks whether the time-based flush
/// threshold has elapsed. Independent of `KEEPALIVE_INTERVAL` — this just
/// needs to be comfortably smaller than the 1s flush interval.
const TICKER_PERIOD: Duration = Duration::from_millis(200);

/// The two-layer log pipeline for a single deployment: a live ring buffer
/// with pub/sub, and a batched writer to the durable store (§4.1).
pub struct LogPipeline {
    ring: RingBuffer,
    writer: BatchWriter,
}

impl LogPipeline {
    fn new(deployment_id: DeploymentId, sink: Arc<dyn LogSink>) -> Arc<Self> {
        let pipeline = Arc::new(Self {
            ring: RingBuffer::new(),
            writer: BatchWriter::new(deployment_id, sink),
        });
        pipeline.clone().spawn_ticker();
        pipeline
    }

    /// Appends a line to both layers: immediately visible to live
    /// subscribers via the ring, and queued for the next durable flush.
    pub async fn append(&self, level: LogLevel, content: impl Into<String>) {
        let entry = LogEntry::new(level, content);
        self.ring.append(entry.clone());
        // A failed durable write must never fail the deployment (§7): the
        // ring buffer already served live observers, so this loss is
        // acceptable and only traced, not propagated.
        if let Err(err) = self.writer.add(entry).await {
            tracing::warn!(error = %err, "failed to queue log entry for durable write");
        }
    }

    pub async fn debug(&self, content: impl Into<String>) {
        self.append(LogLevel::Debug, content).await
    }

    pub async fn info(&self, content: impl Into<String>) {
        self.append(LogLevel::Info, content).await
    }

    pub async fn warning(&self, content: impl Into<String>) {
        self.append(LogLevel::Warning, content).await
    }

    pub async fn error(&self, content: impl Into<String>) {
        self.append(LogLevel::Error, content).await
    }

    pub fn subscribe(&self) -> mpsc::Receiver<LogEntry> {
        self.ring.subscribe()
    }

    /// Forces a flush regardless of batch size or elapsed time — called on
    /// a deployment's terminal-state transition (§4.1).
    pub async fn flush(&self) {
        if let Err(err) = self.writer.flush().await {
            tracing::warn!(error = %err, "failed to flush pending log batch");
        }
    }

    fn spawn_ticker(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICKER_PERIOD);
            loop {
                interval.tick().await;
                // Once nothing references this pipeline but the ticker
                // itself, stop — the registry is the only other owner.
                if Arc::strong_count(&self) == 1 {
                    break;
                }
                if self.writer.should_flush_on_interval().await {
                    self.flush().await;
                }
            }
        });
    }
}
