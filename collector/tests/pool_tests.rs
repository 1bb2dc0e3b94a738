//! Worker pool behaviour: idempotent dispatch, result reporting and purge.

use collector::{CollectContext, CollectFn, CollectionResult, CollectionType, Collector};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const REQUEST: &str = "default/nightly";

/// Collect function that blocks until released and counts its executions.
fn gated_collect(runs: Arc<AtomicUsize>, gate: Arc<Notify>) -> CollectFn {
    Arc::new(move |_context: CollectContext| {
        let runs = runs.clone();
        let gate = gate.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    })
}

/// Writes into `dir` when the collection future is dropped, the way an
/// interrupted writer leaves a late file behind.
struct LateWriter(PathBuf);

impl Drop for LateWriter {
    fn drop(&mut self) {
        std::fs::create_dir_all(&self.0).unwrap();
        std::fs::write(self.0.join("late.json"), b"{}").unwrap();
    }
}

fn late_writing_collect(dir: PathBuf, runs: Arc<AtomicUsize>) -> CollectFn {
    Arc::new(move |_context: CollectContext| {
        let guard = LateWriter(dir.clone());
        let runs = runs.clone();
        async move {
            let _guard = guard;
            runs.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    })
}

fn failing_collect(message: &'static str) -> CollectFn {
    Arc::new(move |_context: CollectContext| {
        async move { Err::<(), _>(anyhow::anyhow!(message)) }.boxed()
    })
}

async fn wait_for(collector: &Collector, expected: CollectionResult) {
    for _ in 0..200 {
        if collector.get_result(REQUEST, CollectionType::Snapshot).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("collector never reported {:?}", expected);
}

#[tokio::test]
async fn test_unknown_request_is_unavailable() {
    let collector = Collector::new(2);
    assert_eq!(
        collector.get_result(REQUEST, CollectionType::Snapshot).await,
        CollectionResult::Unavailable
    );
}

#[tokio::test]
async fn test_redundant_submissions_run_once() {
    let collector = Collector::new(4);
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let queued = collector
        .collect(REQUEST, CollectionType::Snapshot, gated_collect(runs.clone(), gate.clone()))
        .await
        .unwrap();
    assert!(queued);

    for _ in 0..5 {
        let queued = collector
            .collect(REQUEST, CollectionType::Snapshot, gated_collect(runs.clone(), gate.clone()))
            .await
            .unwrap();
        assert!(!queued, "duplicate submission must be a no-op");
    }

    wait_for(&collector, CollectionResult::InProgress).await;
    while runs.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    gate.notify_one();

    wait_for(&collector, CollectionResult::Collected).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_is_reported_with_message() {
    let collector = Collector::new(1);
    collector
        .collect(REQUEST, CollectionType::Snapshot, failing_collect("disk full"))
        .await
        .unwrap();

    wait_for(&collector, CollectionResult::Failed("disk full".to_string())).await;

    // A finished job no longer blocks a new submission.
    let queued = collector
        .collect(REQUEST, CollectionType::Snapshot, failing_collect("disk full"))
        .await
        .unwrap();
    assert!(queued);
}

#[tokio::test]
async fn test_kinds_are_tracked_independently() {
    let collector = Collector::new(2);
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    assert!(collector
        .collect(REQUEST, CollectionType::Snapshot, gated_collect(runs.clone(), gate.clone()))
        .await
        .unwrap());
    assert!(collector
        .collect(REQUEST, CollectionType::Techsupport, gated_collect(runs.clone(), gate.clone()))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_cleanup_cancels_running_job_and_removes_artifacts() {
    let storage = tempfile::tempdir().unwrap();
    let collector = Collector::new(1);
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let artifacts = collector::request_dir(storage.path(), CollectionType::Snapshot, REQUEST);
    std::fs::create_dir_all(&artifacts).unwrap();
    std::fs::write(artifacts.join("old.json"), b"{}").unwrap();

    collector
        .collect(REQUEST, CollectionType::Snapshot, gated_collect(runs.clone(), gate.clone()))
        .await
        .unwrap();
    while runs.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    collector
        .cleanup_entries(storage.path(), REQUEST, CollectionType::Snapshot)
        .await
        .unwrap();

    assert_eq!(
        collector.get_result(REQUEST, CollectionType::Snapshot).await,
        CollectionResult::Unavailable
    );
    assert!(!artifacts.exists());

    // The released gate must not resurrect the purged job.
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        collector.get_result(REQUEST, CollectionType::Snapshot).await,
        CollectionResult::Unavailable
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cleanup_waits_for_cancelled_job_before_removing_artifacts() {
    let storage = tempfile::tempdir().unwrap();
    let collector = Collector::new(1);
    let runs = Arc::new(AtomicUsize::new(0));
    let artifacts = collector::request_dir(storage.path(), CollectionType::Snapshot, REQUEST);

    collector
        .collect(
            REQUEST,
            CollectionType::Snapshot,
            late_writing_collect(artifacts.clone(), runs.clone()),
        )
        .await
        .unwrap();
    while runs.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    collector
        .cleanup_entries(storage.path(), REQUEST, CollectionType::Snapshot)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!artifacts.exists(), "cancelled job wrote after its artifacts were removed");
}

#[tokio::test]
async fn test_cleanup_without_history_is_a_noop() {
    let storage = tempfile::tempdir().unwrap();
    let collector = Collector::new(1);

    collector
        .cleanup_entries(storage.path(), REQUEST, CollectionType::Techsupport)
        .await
        .unwrap();
    collector
        .cleanup_entries(storage.path(), REQUEST, CollectionType::Techsupport)
        .await
        .unwrap();
}
