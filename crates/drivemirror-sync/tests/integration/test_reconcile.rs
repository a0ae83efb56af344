//! Reconciliation cycle tests

use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};

use drivemirror_core::config::UploadStrategy;
use drivemirror_core::domain::FileName;
use drivemirror_sync::coordination::EngineWrite;
use drivemirror_sync::reconcile::ReconciliationEngine;
use drivemirror_sync::SyncError;

use crate::common::{FakeRemoteStore, Fixture};

fn name(raw: &str) -> FileName {
    FileName::new(raw.to_string()).unwrap()
}

#[tokio::test]
async fn test_cycle_downloads_missing_and_deletes_orphans() {
    let fx = Fixture::new();
    fx.write_local("a.txt", b"local only");
    fx.write_local("b.txt", b"both");
    fx.store.seed("b.txt", b"both");
    fx.store.seed("c.txt", b"remote only");

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();

    assert_eq!(report.downloaded, vec![name("c.txt")]);
    assert_eq!(report.deleted, vec![name("a.txt")]);
    assert!(report.failures.is_empty());
    assert_eq!(fx.local_names(), vec!["b.txt", "c.txt"]);
    assert_eq!(std::fs::read(fx.root.join("c.txt")).unwrap(), b"remote only");

    // The remote folder is never modified by a cycle
    assert_eq!(fx.store.names(), vec!["b.txt", "c.txt"]);
    assert_eq!(FakeRemoteStore::count(&fx.store.uploads), 0);
    assert_eq!(FakeRemoteStore::count(&fx.store.deletes), 0);
}

#[tokio::test]
async fn test_second_cycle_without_changes_is_noop() {
    let fx = Fixture::new();
    fx.write_local("a.txt", b"local only");
    fx.store.seed("c.txt", b"remote only");

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let first = engine.reconcile().await.unwrap();
    assert!(!first.is_noop());
    let transfers = fx.store.transfers();

    let second = engine.reconcile().await.unwrap();
    assert!(second.is_noop(), "unexpected work: {second}");
    assert_eq!(fx.store.transfers(), transfers);
    assert_eq!(FakeRemoteStore::count(&fx.store.lists), 2);
}

#[tokio::test]
async fn test_excluded_names_survive() {
    let fx = Fixture::new();
    fx.write_local("token.json", b"{}");
    fx.write_local("notes.txt", b"gone remotely");

    let engine = ReconciliationEngine::new(fx.context(&["token.json"], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();

    assert_eq!(report.deleted, vec![name("notes.txt")]);
    assert_eq!(fx.local_names(), vec!["token.json"]);
}

#[tokio::test]
async fn test_busy_file_is_retried_next_cycle() {
    let fx = Fixture::new();
    let held = fx.write_local("report.csv", b"open in an editor");
    fx.processes.hold(&held);

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.skipped_busy, vec![name("report.csv")]);
    assert!(report.deleted.is_empty());
    assert!(held.exists());

    fx.processes.release_all();
    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.deleted, vec![name("report.csv")]);
    assert!(!held.exists());
}

#[tokio::test]
async fn test_duplicate_remote_names_download_first() {
    let fx = Fixture::new();
    fx.store.seed("dup.txt", b"first");
    fx.store.seed("dup.txt", b"second");

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();

    assert_eq!(report.downloaded, vec![name("dup.txt")]);
    assert_eq!(FakeRemoteStore::count(&fx.store.downloads), 1);
    assert_eq!(std::fs::read(fx.root.join("dup.txt")).unwrap(), b"first");
}

#[tokio::test]
async fn test_directories_and_partials_are_left_alone() {
    let fx = Fixture::new();
    std::fs::create_dir(fx.root.join("photos")).unwrap();
    std::fs::write(fx.root.join("photos").join("nested.jpg"), b"jpeg").unwrap();
    fx.write_local(".big.iso.drivemirror-partial", b"half");

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();

    assert!(report.is_noop(), "unexpected work: {report}");
    assert_eq!(
        fx.local_names(),
        vec![".big.iso.drivemirror-partial", "photos"]
    );
    assert!(fx.root.join("photos").join("nested.jpg").exists());
}

#[tokio::test]
async fn test_listing_failure_skips_cycle() {
    let fx = Fixture::new();
    fx.write_local("keep.txt", b"must not be deleted");
    fx.store.fail_list.store(true, Ordering::SeqCst);

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let err = engine.reconcile().await.unwrap_err();

    assert!(matches!(err, SyncError::RemoteList(_)), "got {err:?}");
    assert!(!err.is_auth());
    assert_eq!(fx.local_names(), vec!["keep.txt"]);
}

#[tokio::test]
async fn test_rejected_credentials_surface_as_auth() {
    let fx = Fixture::new();
    fx.write_local("keep.txt", b"must not be deleted");
    fx.store.reject_credentials.store(true, Ordering::SeqCst);

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let err = engine.reconcile().await.unwrap_err();

    assert!(err.is_auth(), "got {err:?}");
    assert_eq!(fx.local_names(), vec!["keep.txt"]);
}

#[tokio::test]
async fn test_failed_download_is_reported_per_file() {
    let fx = Fixture::new();
    fx.store.seed("broken.bin", b"never arrives");
    fx.store.seed("fine.txt", b"ok");
    fx.store.fail_download_of("broken.bin");

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();

    assert_eq!(report.downloaded, vec![name("fine.txt")]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, name("broken.bin"));
    assert!(report.failures[0].1.contains("connection reset"));
    // Neither the target nor the temp file is left behind
    assert_eq!(fx.local_names(), vec!["fine.txt"]);
}

#[tokio::test]
async fn test_engine_writes_are_recorded_for_echo_suppression() {
    let fx = Fixture::new();
    fx.write_local("old.txt", b"orphan");
    fx.store.seed("new.txt", b"fresh");

    let ctx = fx.context(&[], UploadStrategy::Upsert);
    let engine = ReconciliationEngine::new(ctx.clone());
    engine.reconcile().await.unwrap();

    let window = Duration::from_secs(60);
    let writes = ctx.engine_writes();
    let downloaded = std::fs::metadata(fx.root.join("new.txt")).unwrap();
    assert!(writes.is_own_write(&name("new.txt"), &downloaded, window));
    assert_eq!(writes.recent(&name("old.txt"), window), Some(EngineWrite::Removed));
    assert_eq!(writes.recent(&name("other.txt"), window), None);
}

#[tokio::test]
async fn test_file_uploaded_during_cycle_is_not_deleted() {
    let fx = Fixture::new();
    let pushed = fx.write_local("pushed.txt", b"just saved");
    let ctx = fx.context(&[], UploadStrategy::Upsert);

    // The dispatcher finishes its upload after the listing was requested
    let uploads_ctx = ctx.clone();
    fx.store
        .during_next_list(move || uploads_ctx.uploads().record(&name("pushed.txt")));

    let engine = ReconciliationEngine::new(ctx);
    let report = engine.reconcile().await.unwrap();

    assert_eq!(report.deferred, vec![name("pushed.txt")]);
    assert!(report.deleted.is_empty());
    assert!(pushed.exists());
}

#[tokio::test]
async fn test_file_written_during_cycle_waits_for_next_cycle() {
    let fx = Fixture::new();
    let late = fx.root.join("late.txt");
    let hook_path = late.clone();
    fx.store.during_next_list(move || {
        // File timestamps come from a coarse clock
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(&hook_path, b"created mid-cycle").unwrap();
    });

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.deferred, vec![name("late.txt")]);
    assert!(late.exists());

    // Still absent remotely one cycle later: now it goes
    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.deleted, vec![name("late.txt")]);
    assert!(!late.exists());
}

#[tokio::test]
async fn test_future_mtime_does_not_block_deletion() {
    let fx = Fixture::new();
    let future = fx.write_local("future.txt", b"from a skewed clock");
    let an_hour_ahead = SystemTime::now() + Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&future)
        .unwrap()
        .set_modified(an_hour_ahead)
        .unwrap();

    let engine = ReconciliationEngine::new(fx.context(&[], UploadStrategy::Upsert));
    let report = engine.reconcile().await.unwrap();

    assert_eq!(report.deleted, vec![name("future.txt")]);
    assert!(report.deferred.is_empty());
    assert!(fx.local_names().is_empty());
}
