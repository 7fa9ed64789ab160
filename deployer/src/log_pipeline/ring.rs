use std::collections::VecDeque;
use std::sync::Mutex;

use dockhand_common::LogEntry;
use tokio::sync::mpsc;

/// Capacity of the in-memory ring buffer (§4.1).
const RING_CAPACITY: usize = 1000;

/// Bound on a single subscriber's channel. The ring never blocks on a slow
/// subscriber — a full channel just means that subscriber is dropped.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Per-deployment in-memory ring buffer with pub/sub (§4.1).
///
/// On subscribe, every entry currently held is replayed into the new
/// subscriber's channel before the subscribe call returns, so a subscriber
/// can never observe a gap between "replay" and "live" entries.
pub struct RingBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    subscribers: Mutex<Vec<mpsc::Sender<LogEntry>>>,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RingBuffer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Appends an entry, dropping the oldest on overflow, and fans it out to
    /// every live subscriber. No back-pressure is applied to the caller.
    pub fn append(&self, entry: LogEntry) {
        {
            let mut entries = self.entries.lock().unwrap();
            if entries.len() >= RING_CAPACITY {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.try_send(entry.clone()).is_ok());
    }

    /// Subscribes to future appends, replaying everything currently in the
    /// ring first.
    pub fn subscribe(&self) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            // Best-effort: a fresh channel should never be full, but if the
            // replay itself overflows we drop silently per the same rule as
            // live delivery.
            let _ = tx.try_send(entry.clone());
        }
        drop(entries);

        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_common::LogLevel;

    fn entry(content: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, content)
    }

    #[tokio::test]
    async fn subscribe_replays_existing_entries_in_order() {
        let ring = RingBuffer::new();
        ring.append(entry("one"));
        ring.append(entry("two"));

        let mut rx = ring.subscribe();
        assert_eq!(rx.recv().await.unwrap().content, "one");
        assert_eq!(rx.recv().await.unwrap().content, "two");
    }

    #[tokio::test]
    async fn subscriber_receives_live_appends_after_replay() {
        let ring = RingBuffer::new();
        ring.append(entry("before"));

        let mut rx = ring.subscribe();
        assert_eq!(rx.recv().await.unwrap().content, "before");

        ring.append(entry("after"));
        assert_eq!(rx.recv().await.unwrap().content, "after");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_entry() {
        let ring = RingBuffer::new();
        for i in 0..(RING_CAPACITY + 10) {
            ring.append(entry(&i.to_string()));
        }
        assert_eq!(ring.len(), RING_CAPACITY);

        let mut rx = ring.subscribe();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.content, "10");
    }

    #[tokio::test]
    async fn dropped_subscriber_is_removed_silently() {
        let ring = RingBuffer::new();
        {
            let _rx = ring.subscribe();
            // dropped at end of this scope
        }
        // Should not panic even though the receiver is gone.
        ring.append(entry("after drop"));
        assert_eq!(ring.subscribers.lock().unwrap().len(), 0);
    }
}
