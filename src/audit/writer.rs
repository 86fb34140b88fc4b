use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::store::AccessLogStore;
use super::AccessEntry;

const CHANNEL_CAPACITY: usize = 1024;
const BATCH_SIZE: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Cloneable handle for recording successful calls.
///
/// `record()` never waits: entries go into a bounded channel drained by the
/// task returned from [`create`]. Entries that cannot be queued or written
/// are counted in [`dropped`](Self::dropped).
#[derive(Clone)]
pub struct AccessLogWriter {
    tx: mpsc::Sender<AccessEntry>,
    dropped: Arc<AtomicU64>,
}

impl AccessLogWriter {
    pub fn record(&self, entry: AccessEntry) {
        let reason = match self.tx.try_send(entry) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => "channel full",
            Err(mpsc::error::TrySendError::Closed(_)) => "writer stopped",
        };
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        log::warn!("Access log entry dropped ({}), {} dropped so far", reason, total);
    }

    /// Entries lost since startup, either never queued or failed to insert.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create the writer handle and the background future that drains it.
///
/// The caller spawns the future. It completes once every writer handle has
/// been dropped and the remaining entries are written.
pub fn create(
    store: Arc<AccessLogStore>,
    retention: Duration,
) -> (AccessLogWriter, impl std::future::Future<Output = ()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let writer = AccessLogWriter {
        tx,
        dropped: dropped.clone(),
    };
    let drain = Drain {
        store,
        retention,
        dropped,
        pending: Vec::with_capacity(BATCH_SIZE),
    };
    (writer, drain.run(rx))
}

struct Drain {
    store: Arc<AccessLogStore>,
    retention: Duration,
    dropped: Arc<AtomicU64>,
    pending: Vec<AccessEntry>,
}

impl Drain {
    async fn run(mut self, mut rx: mpsc::Receiver<AccessEntry>) {
        let now = Instant::now();
        let mut flush_tick = interval_at(now + FLUSH_INTERVAL, FLUSH_INTERVAL);
        let mut cleanup_tick = interval_at(now + CLEANUP_INTERVAL, CLEANUP_INTERVAL);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let room = BATCH_SIZE - self.pending.len();
            tokio::select! {
                received = rx.recv_many(&mut self.pending, room) => {
                    // Zero means closed and empty
                    if received == 0 {
                        self.write_pending();
                        let dropped = self.dropped.load(Ordering::Relaxed);
                        if dropped > 0 {
                            log::warn!("Access log stopped, {} entries were dropped", dropped);
                        }
                        return;
                    }
                    if self.pending.len() >= BATCH_SIZE {
                        self.write_pending();
                    }
                }
                _ = flush_tick.tick() => self.write_pending(),
                _ = cleanup_tick.tick() => self.prune(),
            }
        }
    }

    fn write_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if let Err(e) = self.store.insert_batch(&self.pending) {
            let lost = self.pending.len() as u64;
            self.dropped.fetch_add(lost, Ordering::Relaxed);
            log::error!("Access log insert failed, {} entries lost: {}", lost, e);
        }
        self.pending.clear();
    }

    fn prune(&self) {
        match self.store.cleanup_old(self.retention) {
            Ok(0) => {}
            Ok(n) => log::info!("Pruned {} access log entries", n),
            Err(e) => log::error!("Access log pruning failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AccessQuery;

    #[tokio::test]
    async fn entries_are_flushed_when_writers_drop() {
        let store = Arc::new(AccessLogStore::open_in_memory().unwrap());
        let (writer, task) = create(store.clone(), Duration::from_secs(86400));
        let handle = tokio::spawn(task);

        writer.record(AccessEntry::now("key-a", "10.0.0.1", "getAllSubjects"));
        writer.record(AccessEntry::now("key-a", "10.0.0.1", "getAllExams"));
        drop(writer);

        handle.await.unwrap();
        let rows = store.query(&AccessQuery::default()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn full_batches_flush_without_waiting() {
        let store = Arc::new(AccessLogStore::open_in_memory().unwrap());
        let (writer, task) = create(store.clone(), Duration::from_secs(86400));
        let handle = tokio::spawn(task);

        for _ in 0..BATCH_SIZE * 2 {
            writer.record(AccessEntry::now("k", "ip", "getAllFeedback"));
        }
        drop(writer);
        handle.await.unwrap();
        assert_eq!(store.count().unwrap(), BATCH_SIZE * 2);
    }

    #[tokio::test]
    async fn record_after_shutdown_counts_as_dropped() {
        let store = Arc::new(AccessLogStore::open_in_memory().unwrap());
        let (writer, task) = create(store, Duration::from_secs(60));
        drop(task);
        writer.record(AccessEntry::now("k", "ip", "getAllExams"));
        assert_eq!(writer.dropped(), 1);
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let store = Arc::new(AccessLogStore::open_in_memory().unwrap());
        // Task not spawned, so nothing drains the channel
        let (writer, _task) = create(store, Duration::from_secs(60));

        for _ in 0..CHANNEL_CAPACITY + 3 {
            writer.record(AccessEntry::now("k", "ip", "getAllSubjects"));
        }
        assert_eq!(writer.dropped(), 3);
        assert_eq!(writer.clone().dropped(), 3);
    }

    #[tokio::test]
    async fn delivered_entries_are_not_counted_as_dropped() {
        let store = Arc::new(AccessLogStore::open_in_memory().unwrap());
        let (writer, task) = create(store.clone(), Duration::from_secs(86400));
        let handle = tokio::spawn(task);

        writer.record(AccessEntry::now("k", "ip", "updateQuestion"));
        assert_eq!(writer.dropped(), 0);
        drop(writer);
        handle.await.unwrap();

        assert_eq!(store.count().unwrap(), 1);
    }
}
