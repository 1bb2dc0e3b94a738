//! Reconciliation lifecycle tests
//!
//! Drive the reconciler through scheduling, result folding, persistence
//! failures and deletion using in-memory collaborators and a manual clock.

mod common;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use collector::{CollectionResult, CollectionType};
use common::fixtures::*;
use controller::dispatcher::manifest_job_factory;
use controller::errors::{ControllerError, StoreError};
use controller::model::CollectionStatus;
use controller::{
    CollectionRequest, ManualClock, MemoryCatalog, MemoryStore, RequestKey, RequestStore,
    ReverseIndex, Reconciler, TargetMatcher,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_first_touch_records_schedule_then_dispatches_when_due() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, [cluster(namespaces::FLEET_A, "c1", &[("env", "prod")])]);
    let key = harness
        .create(techsupport("nightly", &[("env", "prod")], schedules::EVERY_FIVE_MINUTES, t0))
        .await;

    harness.clock.set(t0 + ChronoDuration::seconds(1));
    let outcome = harness.reconcile(&key).await;

    let stored = harness.stored(&key).await;
    assert_eq!(stored.status.next_schedule_time, Some(at(12, 5, 0)));
    assert_eq!(stored.status.last_run_time, None);
    assert_eq!(stored.status.last_run_status, None);
    assert!(harness.dispatcher.submissions().is_empty());
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(299)));
    assert!(stored.metadata.has_finalizer(stored.finalizer()));

    let second = at(12, 5, 1);
    harness.clock.set(second);
    harness.reconcile(&key).await;

    let stored = harness.stored(&key).await;
    assert_eq!(stored.status.last_run_time, Some(second));
    assert_eq!(stored.status.next_schedule_time, Some(at(12, 10, 0)));

    let submissions = harness.dispatcher.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].request_name, "ops/nightly");
    assert_eq!(submissions[0].collection_type, CollectionType::Techsupport);
}

#[tokio::test]
async fn test_repeated_reconcile_inside_debounce_window_dispatches_once() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, []);
    let key = harness
        .create(techsupport("nightly", &[], schedules::EVERY_FIVE_MINUTES, t0))
        .await;

    harness.clock.set(at(12, 0, 1));
    harness.reconcile(&key).await;

    harness.clock.set(at(12, 5, 1));
    harness.reconcile(&key).await;
    harness.clock.set(at(12, 5, 10));
    harness.reconcile(&key).await;

    assert_eq!(harness.dispatcher.submissions().len(), 1);
}

#[tokio::test]
async fn test_failed_collection_is_folded_and_schedule_still_advances() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, []);
    let key = harness
        .create(techsupport("nightly", &[], schedules::EVERY_FIVE_MINUTES, t0))
        .await;

    harness.clock.set(at(12, 0, 1));
    harness.reconcile(&key).await;

    harness.dispatcher.set_result(
        "ops/nightly",
        CollectionType::Techsupport,
        CollectionResult::Failed("disk full".to_string()),
    );
    harness.clock.set(at(12, 7, 0));
    let outcome = harness.reconcile(&key).await;

    let stored = harness.stored(&key).await;
    assert_eq!(stored.status.last_run_status, Some(CollectionStatus::Failed));
    assert_eq!(stored.status.failure_message, "disk full");
    assert_eq!(stored.status.next_schedule_time, Some(at(12, 10, 0)));
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(180)));
}

#[tokio::test]
async fn test_in_progress_collection_polls_after_fixed_delay() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, []);
    let key = harness
        .create(techsupport("nightly", &[], schedules::HOURLY, t0))
        .await;

    harness.dispatcher.set_result(
        "ops/nightly",
        CollectionType::Techsupport,
        CollectionResult::InProgress,
    );
    harness.clock.set(at(12, 0, 1));
    let outcome = harness.reconcile(&key).await;

    let stored = harness.stored(&key).await;
    assert_eq!(stored.status.last_run_status, Some(CollectionStatus::InProgress));
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(20)));
}

#[tokio::test]
async fn test_matched_targets_are_recorded_in_status_and_index() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(
        t0,
        [
            cluster(namespaces::FLEET_A, "c1", &[("env", "prod")]),
            cluster(namespaces::FLEET_A, "c2", &[("env", "dev")]),
            sveltos_cluster(namespaces::FLEET_B, "s1", &[("env", "prod")]),
        ],
    );
    let key = harness
        .create(techsupport("nightly", &[("env", "prod")], schedules::HOURLY, t0))
        .await;

    harness.reconcile(&key).await;

    let stored = harness.stored(&key).await;
    let names: Vec<&str> = stored
        .status
        .matching_cluster_refs
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["c1", "s1"]);
    assert_eq!(harness.index.targets_of(&key).await.len(), 2);
}

#[tokio::test]
async fn test_unparseable_schedule_is_a_reconcile_error() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, []);
    let key = harness
        .create(techsupport("broken", &[], "not a cron", t0))
        .await;

    let err = harness.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ControllerError::Schedule(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_deletion_purges_and_releases_finalizer() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, [cluster(namespaces::FLEET_A, "c1", &[("env", "prod")])]);
    let key = harness
        .create(techsupport("nightly", &[("env", "prod")], schedules::HOURLY, t0))
        .await;
    harness.reconcile(&key).await;
    assert!(harness.index.snapshot().await.request_to_targets.contains_key(&key));

    let marked = harness.store.delete(&key).await.unwrap();
    assert!(marked.is_some_and(|r| r.metadata.is_deleting()));

    let outcome = harness.reconcile(&key).await;
    assert_eq!(outcome.requeue_after, None);
    assert_eq!(harness.dispatcher.purges().len(), 1);

    let err = harness.store.get(&key).await.unwrap_err();
    assert!(err.is_not_found());

    let snapshot = harness.index.snapshot().await;
    assert!(snapshot.request_to_targets.is_empty());
    assert!(snapshot.target_to_requests.is_empty());
}

#[tokio::test]
async fn test_purge_failure_keeps_finalizer() {
    let t0 = at(12, 0, 0);
    let harness = TestHarness::new(t0, []);
    let key = harness
        .create(techsupport("nightly", &[], schedules::HOURLY, t0))
        .await;
    harness.reconcile(&key).await;
    harness.store.delete(&key).await.unwrap();

    harness.dispatcher.fail_purges(true);
    assert!(harness.reconciler.reconcile(&key).await.is_err());

    let stored = harness.stored(&key).await;
    assert!(stored.metadata.is_deleting());
    assert!(stored.metadata.has_finalizer(stored.finalizer()));

    harness.dispatcher.fail_purges(false);
    harness.reconcile(&key).await;
    assert!(harness.store.get(&key).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_missing_request_is_dropped_from_index() {
    let harness = TestHarness::new(at(12, 0, 0), []);
    let key = RequestKey::new(CollectionType::Snapshot, namespaces::OPS, "gone");

    let outcome = harness.reconcile(&key).await;
    assert_eq!(outcome.requeue_after, None);
}

/// Store whose status writes can be made to fail.
struct FlakyStatusStore {
    inner: MemoryStore,
    fail_status: AtomicBool,
}

#[async_trait]
impl RequestStore for FlakyStatusStore {
    async fn get(&self, key: &RequestKey) -> Result<CollectionRequest, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self) -> Result<Vec<CollectionRequest>, StoreError> {
        self.inner.list().await
    }

    async fn create(&self, request: CollectionRequest) -> Result<CollectionRequest, StoreError> {
        self.inner.create(request).await
    }

    async fn update(&self, request: &CollectionRequest) -> Result<Option<CollectionRequest>, StoreError> {
        self.inner.update(request).await
    }

    async fn update_status(&self, request: &CollectionRequest) -> Result<CollectionRequest, StoreError> {
        if self.fail_status.load(Ordering::SeqCst) {
            let key = request.key()?;
            return Err(StoreError::Conflict {
                key,
                expected: request.metadata.resource_version,
                actual: request.metadata.resource_version + 1,
            });
        }
        self.inner.update_status(request).await
    }

    async fn delete(&self, key: &RequestKey) -> Result<Option<CollectionRequest>, StoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn test_failed_status_write_requeues_without_recording_the_run() {
    let t0 = at(12, 0, 0);
    let clock = Arc::new(ManualClock::new(t0));
    let store = Arc::new(FlakyStatusStore {
        inner: MemoryStore::with_clock(clock.clone()),
        fail_status: AtomicBool::new(false),
    });
    let dispatcher = Arc::new(MockDispatcher::new());
    let reconciler = Reconciler::new(
        store.clone(),
        TargetMatcher::new(Arc::new(MemoryCatalog::new())),
        Arc::new(ReverseIndex::new()),
        dispatcher.clone(),
        manifest_job_factory(),
        clock.clone(),
    );

    let key = store
        .create(techsupport("nightly", &[], schedules::EVERY_FIVE_MINUTES, t0))
        .await
        .unwrap()
        .key()
        .unwrap();

    clock.set(at(12, 0, 1));
    reconciler.reconcile(&key).await.unwrap();

    store.fail_status.store(true, Ordering::SeqCst);
    clock.set(at(12, 5, 1));
    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(20)));
    assert_eq!(dispatcher.submissions().len(), 1);

    let stored = store.get(&key).await.unwrap();
    assert_eq!(stored.status.last_run_time, None);
    assert_eq!(stored.status.next_schedule_time, Some(at(12, 5, 0)));
}
