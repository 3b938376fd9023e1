//! Session persistence: resumable snapshots keyed by interview id.
//!
//! Writes go through a [`DebouncedSink`] so that bursts of turn updates collapse into
//! one durable write. Storage failures never reach the session loop; they are logged
//! and the session simply loses resumability.

use crate::error::VivaResult;
use crate::model::{now_epoch_millis, PersistedSnapshot};
use crate::store::KvStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "interview_state_";

pub fn snapshot_key(interview_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, interview_id)
}

type Writer<T> = Arc<dyn Fn(T) + Send + Sync>;

struct PendingWrite {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Coalesces writes: `schedule` re-arms a single timer, `flush` writes now.
///
/// A scheduled write that lost the race to `cancel`/`flush` is discarded; the
/// generation check and the write both happen under the same lock.
pub struct DebouncedSink<T> {
    delay: Duration,
    writer: Writer<T>,
    pending: Arc<Mutex<PendingWrite>>,
}

impl<T: Send + 'static> DebouncedSink<T> {
    pub fn new<F>(delay: Duration, writer: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            delay,
            writer: Arc::new(writer),
            pending: Arc::new(Mutex::new(PendingWrite {
                generation: 0,
                handle: None,
            })),
        }
    }

    /// Cancel any pending write and arm a new one. Must be called inside a tokio runtime.
    pub fn schedule(&self, value: T) {
        let Ok(mut slot) = self.pending.lock() else {
            return;
        };
        slot.generation += 1;
        if let Some(h) = slot.handle.take() {
            h.abort();
        }
        let generation = slot.generation;
        let delay = self.delay;
        let writer = Arc::clone(&self.writer);
        let pending = Arc::clone(&self.pending);
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut slot) = pending.lock() {
                if slot.generation == generation {
                    slot.handle = None;
                    writer(value);
                }
            }
        }));
    }

    /// Write immediately, superseding anything pending.
    pub fn flush(&self, value: T) {
        if let Ok(mut slot) = self.pending.lock() {
            slot.generation += 1;
            if let Some(h) = slot.handle.take() {
                h.abort();
            }
            (self.writer)(value);
        }
    }

    /// Drop any pending write without writing.
    pub fn cancel(&self) {
        if let Ok(mut slot) = self.pending.lock() {
            slot.generation += 1;
            if let Some(h) = slot.handle.take() {
                h.abort();
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|slot| slot.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl<T> Drop for DebouncedSink<T> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.pending.lock() {
            if let Some(h) = slot.handle.take() {
                h.abort();
            }
        }
    }
}

/// Stateless load/write/clear of snapshots with the staleness rule applied on load.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KvStore>,
    staleness_window: Duration,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KvStore>, staleness_window: Duration) -> Self {
        Self {
            store,
            staleness_window,
        }
    }

    /// Returns `None` when there is no record, it cannot be decoded, or it is older than the window.
    pub fn load(&self, interview_id: &str) -> Option<PersistedSnapshot> {
        let key = snapshot_key(interview_id);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to load interview state {}: {}", interview_id, e);
                return None;
            }
        };
        let snapshot: PersistedSnapshot = match serde_json::from_slice(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!("Discarding unreadable interview state {}: {}", interview_id, e);
                return None;
            }
        };
        let age_ms = now_epoch_millis() - snapshot.saved_at_epoch_millis;
        if age_ms < 0 || age_ms as u128 >= self.staleness_window.as_millis() {
            debug!("Interview state {} is stale ({}ms old), ignoring", interview_id, age_ms);
            return None;
        }
        debug!("Found saved interview state for {}", interview_id);
        Some(snapshot)
    }

    /// Stamp the write time and store the snapshot.
    pub fn write(&self, interview_id: &str, mut snapshot: PersistedSnapshot) -> VivaResult<()> {
        snapshot.saved_at_epoch_millis = now_epoch_millis();
        self.write_raw(interview_id, &snapshot)
    }

    /// Store the snapshot as-is, keeping its timestamp.
    pub fn write_raw(&self, interview_id: &str, snapshot: &PersistedSnapshot) -> VivaResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store.set(&snapshot_key(interview_id), &bytes)
    }

    pub fn clear(&self, interview_id: &str) -> VivaResult<()> {
        self.store.remove(&snapshot_key(interview_id))
    }

    /// The backing store, shared with completion records.
    pub fn store(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.store)
    }
}

/// Persistence bound to one interview: debounced `save`, `save_immediate`, `load`, `clear`.
pub struct SessionPersistence {
    interview_id: String,
    snapshots: SnapshotStore,
    sink: DebouncedSink<PersistedSnapshot>,
}

impl SessionPersistence {
    pub fn new(snapshots: SnapshotStore, interview_id: impl Into<String>, debounce: Duration) -> Self {
        let interview_id = interview_id.into();
        let writer_store = snapshots.clone();
        let writer_id = interview_id.clone();
        let sink = DebouncedSink::new(debounce, move |snapshot: PersistedSnapshot| {
            match writer_store.write(&writer_id, snapshot) {
                Ok(()) => debug!("Interview state saved for {}", writer_id),
                Err(e) => warn!("Failed to save interview state for {}: {}", writer_id, e),
            }
        });
        Self {
            interview_id,
            snapshots,
            sink,
        }
    }

    /// Debounced save; safe to call on every change.
    pub fn save(&self, snapshot: PersistedSnapshot) {
        self.sink.schedule(snapshot);
    }

    /// Write now (pause, abort).
    pub fn save_immediate(&self, snapshot: PersistedSnapshot) {
        self.sink.flush(snapshot);
    }

    pub fn load(&self) -> Option<PersistedSnapshot> {
        self.snapshots.load(&self.interview_id)
    }

    /// Drop pending writes and remove the record. Idempotent.
    pub fn clear(&self) {
        self.sink.cancel();
        match self.snapshots.clear(&self.interview_id) {
            Ok(()) => debug!("Interview state cleared for {}", self.interview_id),
            Err(e) => warn!("Failed to clear interview state for {}: {}", self.interview_id, e),
        }
    }

    pub fn has_pending_write(&self) -> bool {
        self.sink.has_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn schedule_coalesces_bursts() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let w = Arc::clone(&writes);
        let sink = DebouncedSink::new(Duration::from_secs(2), move |v: u32| {
            w.lock().unwrap().push(v);
        });

        for i in 0..5 {
            sink.schedule(i);
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        assert!(writes.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*writes.lock().unwrap(), vec![4]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_supersedes_pending() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sink = DebouncedSink::new(Duration::from_secs(2), move |_: u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        sink.schedule(1);
        sink.flush(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sink = DebouncedSink::new(Duration::from_secs(2), move |_: u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        sink.schedule(1);
        assert!(sink.has_pending());
        sink.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!sink.has_pending());
    }
}
