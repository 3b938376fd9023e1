//! Integration test: resumable interview snapshots on a Sled store.
//!
//! Verifies that:
//! 1. A saved snapshot loads back with equal turns and progress.
//! 2. A snapshot older than the staleness window is never returned.
//! 3. Clearing is idempotent and also discards a pending debounced write.
//! 4. An unreadable record is treated as absent.

use std::sync::Arc;
use std::time::Duration;
use viva_core::{
    now_epoch_millis, snapshot_key, KvStore, PersistedSnapshot, SessionPersistence,
    SessionProgress, SledStore, SnapshotStore, TurnRecord,
};

const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

fn sample_snapshot() -> PersistedSnapshot {
    let mut progress = SessionProgress::fresh(1800, now_epoch_millis());
    progress.advance(3);
    progress.remaining_seconds = 1500;
    PersistedSnapshot::new(
        vec![
            TurnRecord::ai("Hello Ada! Let's begin! What is a lifetime?"),
            TurnRecord::candidate("It bounds how long a reference is valid."),
            TurnRecord::ai("Good. Next question: what is Send?"),
        ],
        progress,
        true,
    )
}

fn open_store(dir: &tempfile::TempDir) -> Arc<dyn KvStore> {
    Arc::new(SledStore::open_path(dir.path()).unwrap())
}

#[test]
fn snapshot_roundtrip_within_window() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotStore::new(open_store(&dir), TWO_HOURS);
    let snap = sample_snapshot();

    snapshots.write("iv-1", snap.clone()).unwrap();
    let loaded = snapshots.load("iv-1").expect("fresh snapshot should load");

    assert_eq!(loaded.turns, snap.turns);
    assert_eq!(loaded.progress, snap.progress);
    assert!(loaded.is_active);
    assert!(loaded.saved_at_epoch_millis > 0);
    assert!(snapshots.load("iv-other").is_none());
}

#[test]
fn stale_snapshot_is_never_returned() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotStore::new(open_store(&dir), TWO_HOURS);

    let mut snap = sample_snapshot();
    snap.saved_at_epoch_millis = now_epoch_millis() - TWO_HOURS.as_millis() as i64 - 1_000;
    snapshots.write_raw("iv-stale", &snap).unwrap();
    assert!(snapshots.load("iv-stale").is_none());

    // just inside the window still loads
    snap.saved_at_epoch_millis = now_epoch_millis() - 60_000;
    snapshots.write_raw("iv-stale", &snap).unwrap();
    assert!(snapshots.load("iv-stale").is_some());
}

#[test]
fn unreadable_record_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.set(&snapshot_key("iv-bad"), b"{not json").unwrap();

    let snapshots = SnapshotStore::new(store, TWO_HOURS);
    assert!(snapshots.load("iv-bad").is_none());
}

#[tokio::test]
async fn clear_is_idempotent_and_cancels_pending_save() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotStore::new(open_store(&dir), TWO_HOURS);
    let persistence = SessionPersistence::new(snapshots, "iv-2", Duration::from_millis(50));

    persistence.save_immediate(sample_snapshot());
    assert!(persistence.load().is_some());

    persistence.save(sample_snapshot());
    assert!(persistence.has_pending_write());
    persistence.clear();
    persistence.clear();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(persistence.load().is_none());
    assert!(!persistence.has_pending_write());
}

#[tokio::test]
async fn debounced_save_lands_after_window() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotStore::new(open_store(&dir), TWO_HOURS);
    let persistence = SessionPersistence::new(snapshots, "iv-3", Duration::from_millis(50));

    persistence.save(sample_snapshot());
    assert!(persistence.load().is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let loaded = persistence.load().expect("debounced write should have landed");
    assert_eq!(loaded.progress.current_question_index, 1);
}
