//! Reconciler wired to in-memory collaborators and a manual clock

use chrono::{DateTime, Utc};
use controller::dispatcher::manifest_job_factory;
use controller::{
    CollectionRequest, ManualClock, MemoryCatalog, MemoryStore, ReconcileOutcome, Reconciler,
    RequestKey, RequestStore, ReverseIndex, Target, TargetMatcher,
};
use std::sync::Arc;

use super::MockDispatcher;

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub index: Arc<ReverseIndex>,
    pub dispatcher: Arc<MockDispatcher>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler,
}

impl TestHarness {
    pub fn new(start: DateTime<Utc>, targets: impl IntoIterator<Item = Target>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let catalog = Arc::new(MemoryCatalog::with_targets(targets));
        let index = Arc::new(ReverseIndex::new());
        let dispatcher = Arc::new(MockDispatcher::new());

        let reconciler = Reconciler::new(
            store.clone(),
            TargetMatcher::new(catalog.clone()),
            index.clone(),
            dispatcher.clone(),
            manifest_job_factory(),
            clock.clone(),
        );

        Self {
            store,
            catalog,
            index,
            dispatcher,
            clock,
            reconciler,
        }
    }

    /// Stores `request` and returns its key.
    pub async fn create(&self, request: CollectionRequest) -> RequestKey {
        let created = self.store.create(request).await.unwrap();
        created.key().unwrap()
    }

    pub async fn reconcile(&self, key: &RequestKey) -> ReconcileOutcome {
        self.reconciler.reconcile(key).await.unwrap()
    }

    pub async fn stored(&self, key: &RequestKey) -> CollectionRequest {
        self.store.get(key).await.unwrap()
    }
}
