//! Service lifecycle tests

use std::sync::atomic::Ordering;
use std::time::Duration;

use drivemirror_core::config::UploadStrategy;
use drivemirror_sync::service::SyncService;
use drivemirror_sync::SyncError;

use crate::common::{FakeRemoteStore, Fixture};

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_reconciles_and_uploads_until_stopped() {
    let fx = Fixture::new();
    fx.store.seed("from-remote.txt", b"hello");

    // The first cycle runs immediately; the long interval keeps later
    // cycles out of the way of the watcher path.
    let service = SyncService::new(fx.context(&[], UploadStrategy::Upsert))
        .with_interval(Duration::from_secs(3600))
        .with_queue_capacity(16);
    let running = service.start().unwrap();

    let downloaded = fx.root.join("from-remote.txt");
    assert!(eventually(|| downloaded.exists()).await, "initial cycle did not download");

    fx.write_local("from-local.txt", b"world");
    let store = fx.store.clone();
    assert!(
        eventually(|| store.names().contains(&"from-local.txt".to_string())).await,
        "watcher did not upload the new file"
    );
    // The download itself must not bounce back as an upload
    assert_eq!(
        fx.store
            .names()
            .iter()
            .filter(|n| n.as_str() == "from-remote.txt")
            .count(),
        1
    );

    assert!(running.stop(Duration::from_secs(5)).await);

    let uploads = FakeRemoteStore::count(&fx.store.uploads);
    fx.write_local("after-stop.txt", b"ignored");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(FakeRemoteStore::count(&fx.store.uploads), uploads);
}

#[tokio::test]
async fn test_service_fails_to_start_without_local_root() {
    let fx = Fixture::new();
    let ctx = fx.context(&[], UploadStrategy::Upsert);
    std::fs::remove_dir(&fx.root).unwrap();

    let err = SyncService::new(ctx).start().err().unwrap();
    assert!(matches!(err, SyncError::Watch(_)), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_token_stops_service() {
    let fx = Fixture::new();
    let running = SyncService::new(fx.context(&[], UploadStrategy::Upsert))
        .with_interval(Duration::from_millis(20))
        .start()
        .unwrap();

    assert!(eventually(|| FakeRemoteStore::count(&fx.store.lists) >= 2).await);
    running.cancellation_token().cancel();
    assert!(running.stop(Duration::from_secs(5)).await);

    let lists = FakeRemoteStore::count(&fx.store.lists);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(FakeRemoteStore::count(&fx.store.lists), lists);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_keeps_running_after_failed_cycles() {
    let fx = Fixture::new();
    fx.store.fail_list.store(true, Ordering::SeqCst);
    let running = SyncService::new(fx.context(&[], UploadStrategy::Upsert))
        .with_interval(Duration::from_millis(20))
        .start()
        .unwrap();

    assert!(
        eventually(|| FakeRemoteStore::count(&fx.store.lists) >= 4).await,
        "failed cycles stopped the timer"
    );
    assert!(fx.local_names().is_empty());

    fx.store.seed("recovered.txt", b"back online");
    fx.store.fail_list.store(false, Ordering::SeqCst);
    let recovered = fx.root.join("recovered.txt");
    assert!(eventually(|| recovered.exists()).await, "no cycle ran after recovery");

    assert!(running.stop(Duration::from_secs(5)).await);
}
