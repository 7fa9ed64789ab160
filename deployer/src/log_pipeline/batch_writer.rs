use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dockhand_common::{DeploymentId, LogEntry};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Flush thresholds (§4.1 "Batched writer").
const BATCH_SIZE: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// The durable side of the log pipeline: whoever owns the relational store
/// implements this to receive flushed batches.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn insert_logs(
        &self,
        deployment_id: DeploymentId,
        entries: &[LogEntry],
    ) -> Result<(), sqlx::Error>;
}

struct Pending {
    entries: Vec<LogEntry>,
    last_flush: Instant,
}

/// Accumulates log entries and flushes them to the durable store in
/// batches, so a chatty deployment doesn't issue one commit per line
/// (§4.1).
pub struct BatchWriter {
    deployment_id: DeploymentId,
    sink: Arc<dyn LogSink>,
    pending: Mutex<Pending>,
}

impl BatchWriter {
    pub fn new(deployment_id: DeploymentId, sink: Arc<dyn LogSink>) -> Self {
        Self {
            deployment_id,
            sink,
            pending: Mutex::new(Pending {
                entries: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Adds an entry to the batch, flushing immediately if the batch size
    /// threshold is reached.
    pub async fn add(&self, entry: LogEntry) -> Result<(), sqlx::Error> {
        let should_flush = {
            let mut pending = self.pending.lock().await;
            pending.entries.push(entry);
            pending.entries.len() >= BATCH_SIZE
        };

        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flushes unconditionally — used for the periodic time-based trigger
    /// and for the forced flush on terminal-state transition.
    pub async fn flush(&self) -> Result<(), sqlx::Error> {
        let batch = {
            let mut pending = self.pending.lock().await;
            if pending.entries.is_empty() {
                return Ok(());
            }
            let batch = std::mem::take(&mut pending.entries);
            pending.last_flush = Instant::now();
            batch
        };

        self.sink.insert_logs(self.deployment_id, &batch).await
    }

    /// True once the interval has elapsed with something still pending;
    /// drives the background ticker in [`super::LogPipeline::spawn_ticker`].
    pub async fn should_flush_on_interval(&self) -> bool {
        let pending = self.pending.lock().await;
        !pending.entries.is_empty() && pending.last_flush.elapsed() >= FLUSH_INTERVAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_common::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        batches: AtomicUsize,
        rows: AtomicUsize,
    }

    #[async_trait]
    impl LogSink for CountingSink {
        async fn insert_logs(
            &self,
            _deployment_id: DeploymentId,
            entries: &[LogEntry],
        ) -> Result<(), sqlx::Error> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.rows.fetch_add(entries.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn entry() -> LogEntry {
        LogEntry::new(LogLevel::Info, "line")
    }

    #[tokio::test]
    async fn flushes_automatically_at_batch_size() {
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            rows: AtomicUsize::new(0),
        });
        let writer = BatchWriter::new(1, sink.clone());

        for _ in 0..BATCH_SIZE {
            writer.add(entry()).await.unwrap();
        }

        assert_eq!(sink.batches.load(Ordering::SeqCst), 1);
        assert_eq!(sink.rows.load(Ordering::SeqCst), BATCH_SIZE);
    }

    #[tokio::test]
    async fn manual_flush_is_a_noop_when_empty() {
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            rows: AtomicUsize::new(0),
        });
        let writer = BatchWriter::new(1, sink.clone());
        writer.flush().await.unwrap();
        assert_eq!(sink.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_batch_flushes_on_explicit_call() {
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            rows: AtomicUsize::new(0),
        });
        let writer = BatchWriter::new(1, sink.clone());
        writer.add(entry()).await.unwrap();
        writer.add(entry()).await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(sink.batches.load(Ordering::SeqCst), 1);
        assert_eq!(sink.rows.load(Ordering::SeqCst), 2);
    }
}
