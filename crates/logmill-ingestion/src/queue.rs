use logmill_core::LogEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// The event is queued for the writer
    Accepted,
    /// The queue was full; the event is gone
    Dropped,
    /// The queue is closed (pipeline shut down); the event is gone
    Rejected,
}

/// Counters shared by every sender of one queue
#[derive(Debug, Default)]
pub struct QueueStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub accepted: u64,
    pub dropped: u64,
    pub rejected: u64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the ingestion queue
///
/// Cloning is cheap; all clones feed the same queue and share counters.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::Sender<LogEvent>,
    stats: Arc<QueueStats>,
}

impl EventSender {
    /// Offer an event without waiting.
    ///
    /// A full queue drops the event. The drop is counted and reported on the
    /// diagnostic channel at every power-of-two total so floods stay quiet.
    pub fn enqueue(&self, event: LogEvent) -> Enqueue {
        match self.inner.try_send(event) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Enqueue::Accepted
            }
            Err(TrySendError::Full(_)) => {
                let total = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total.is_power_of_two() {
                    warn!(dropped_total = total, "log queue full, dropping event");
                }
                Enqueue::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Enqueue::Rejected
            }
        }
    }

    pub fn stats(&self) -> QueueSnapshot {
        self.stats.snapshot()
    }

    /// Number of events currently waiting
    pub fn depth(&self) -> usize {
        self.inner.max_capacity() - self.inner.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.inner.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Consumer side of the ingestion queue; there is exactly one per queue
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::Receiver<LogEvent>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once closed and empty
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.inner.recv().await
    }

    /// Take the next event if one is ready
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.inner.try_recv().ok()
    }

    /// Stop accepting new events; already queued events can still be received
    pub fn close(&mut self) {
        self.inner.close();
    }
}

/// Create a bounded ingestion queue
///
/// A zero capacity is raised to one.
pub fn create_event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSender {
            inner: tx,
            stats: Arc::new(QueueStats::default()),
        },
        EventReceiver { inner: rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use logmill_core::Level;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn event(seq: u64) -> LogEvent {
        LogEvent::new(Level::Info, "test").with_attr("seq", json!(seq))
    }

    fn seq_of(event: &LogEvent) -> u64 {
        event.attrs["seq"].as_u64().unwrap()
    }

    #[test]
    fn test_overflow_drops_exactly_one() {
        let capacity = 16;
        let (sender, _receiver) = create_event_queue(capacity);

        let started = Instant::now();
        let outcomes: Vec<_> = (0..=capacity as u64).map(|i| sender.enqueue(event(i))).collect();
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(
            outcomes.iter().filter(|o| **o == Enqueue::Accepted).count(),
            capacity
        );
        assert_eq!(outcomes.last(), Some(&Enqueue::Dropped));
        assert_eq!(
            sender.stats(),
            QueueSnapshot {
                accepted: capacity as u64,
                dropped: 1,
                rejected: 0
            }
        );
        assert_eq!(sender.depth(), capacity);
    }

    #[test]
    fn test_fifo_order() {
        let (sender, mut receiver) = create_event_queue(100);
        for i in 0..50 {
            sender.enqueue(event(i));
        }

        let received: Vec<u64> = std::iter::from_fn(|| receiver.try_recv())
            .map(|e| seq_of(&e))
            .collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_closed_queue_rejects_but_drains() {
        let (sender, mut receiver) = create_event_queue(4);
        assert_eq!(sender.enqueue(event(1)), Enqueue::Accepted);

        receiver.close();
        assert!(sender.is_closed());
        assert_eq!(sender.enqueue(event(2)), Enqueue::Rejected);
        assert_eq!(sender.stats().rejected, 1);

        assert_eq!(receiver.try_recv().map(|e| seq_of(&e)), Some(1));
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (sender, _receiver) = create_event_queue(0);
        assert_eq!(sender.capacity(), 1);
    }

    #[test]
    fn test_concurrent_producers_share_counters() {
        let (sender, mut receiver) = create_event_queue(10_000);
        let handles: Vec<_> = (0..8)
            .map(|p| {
                let sender = sender.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        sender.enqueue(event(p * 1000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(sender.stats().accepted, 800);
        let mut per_producer: Vec<Vec<u64>> = vec![Vec::new(); 8];
        while let Some(e) = receiver.try_recv() {
            let seq = seq_of(&e);
            per_producer[(seq / 1000) as usize].push(seq % 1000);
        }
        // each producer's own events keep their relative order
        for seqs in per_producer {
            assert_eq!(seqs, (0..100).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_recv_waits_for_event() {
        let (sender, mut receiver) = create_event_queue(4);
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.enqueue(event(9));
        });

        let got = receiver.recv().await.unwrap();
        assert_eq!(seq_of(&got), 9);
        producer.await.unwrap();
    }
}
