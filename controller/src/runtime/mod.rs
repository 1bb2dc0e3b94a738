// File: controller/src/runtime/mod.rs
pub mod queue;
pub use queue::WorkQueue;

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::constants::scheduling::REQUEUE_AFTER;
use crate::index::ReverseIndex;
use crate::matcher::MemoryCatalog;
use crate::model::{CollectionRequest, RequestKey, Target};
use crate::predicates::{WatchEvent, REQUEST_PREDICATES, TARGET_PREDICATES};
use crate::reconciler::Reconciler;
use crate::store::RequestStore;

/// Turns watch notifications into reconcile requests.
#[derive(Clone)]
pub struct EventRouter {
    index: Arc<ReverseIndex>,
    queue: WorkQueue<RequestKey>,
}

impl EventRouter {
    pub fn new(index: Arc<ReverseIndex>, queue: WorkQueue<RequestKey>) -> Self {
        Self { index, queue }
    }

    /// Enqueues every request that consumes, or would now select, the target.
    /// Returns the number of requests enqueued.
    pub async fn on_target_event(&self, event: &WatchEvent<Target>) -> usize {
        if !TARGET_PREDICATES.admit(event) {
            return 0;
        }

        let keys = match event {
            WatchEvent::Update { old: Some(old), new } => {
                let mut keys = self.index.requests_for_target(old).await;
                keys.extend(self.index.requests_for_target(new).await);
                keys.sort();
                keys.dedup();
                keys
            }
            other => self.index.requests_for_target(other.object()).await,
        };

        let target = event.object();
        debug!(
            "{} {}/{} changed, enqueuing {} requests",
            target.kind.as_str(),
            target.namespace,
            target.name,
            keys.len()
        );
        let count = keys.len();
        for key in keys {
            self.queue.add(key);
        }
        count
    }

    pub fn on_request_event(&self, event: &WatchEvent<CollectionRequest>) -> bool {
        if !REQUEST_PREDICATES.admit(event) {
            return false;
        }
        match event.object().key() {
            Ok(key) => {
                self.queue.add(key);
                true
            }
            Err(e) => {
                warn!("Ignoring request event: {}", e);
                false
            }
        }
    }
}

/// Applies a target change to the catalog and routes the resulting event.
pub async fn apply_target(catalog: &MemoryCatalog, router: &EventRouter, target: Target) -> usize {
    let reference = target.reference();
    let event = match catalog.upsert(target.clone()).await {
        Some(old) => WatchEvent::Update {
            old: Some(old),
            new: target,
        },
        None => WatchEvent::Create(target),
    };
    debug!("Catalog updated for {}", reference);
    router.on_target_event(&event).await
}

/// Removes a target from the catalog and routes the deletion.
pub async fn remove_target(
    catalog: &MemoryCatalog,
    router: &EventRouter,
    reference: &crate::model::TargetReference,
) -> Option<usize> {
    let removed = catalog.remove(reference).await?;
    Some(router.on_target_event(&WatchEvent::Delete(removed)).await)
}

/// Drives reconcile workers off the work queue.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: WorkQueue<RequestKey>,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, queue: WorkQueue<RequestKey>) -> Self {
        Self { reconciler, queue }
    }

    pub fn queue(&self) -> &WorkQueue<RequestKey> {
        &self.queue
    }

    /// Enqueues every stored request so the index is rebuilt after a restart.
    pub async fn enqueue_all(&self, store: &dyn RequestStore) -> anyhow::Result<usize> {
        let requests = store.list().await?;
        let mut count = 0;
        for request in requests {
            match request.key() {
                Ok(key) => {
                    self.queue.add(key);
                    count += 1;
                }
                Err(e) => warn!("Skipping stored request: {}", e),
            }
        }
        info!("Enqueued {} stored requests", count);
        Ok(count)
    }

    /// Runs `workers` reconcile loops until the queue shuts down.
    pub async fn run(&self, workers: usize) {
        info!("Starting controller with {} reconcile workers", workers);

        let mut set = JoinSet::new();
        for worker_id in 0..workers.max(1) {
            let reconciler = self.reconciler.clone();
            let queue = self.queue.clone();
            set.spawn(async move {
                while let Some(key) = queue.get().await {
                    process(&reconciler, &queue, &key).await;
                    queue.done(&key);
                }
                debug!("Reconcile worker {} stopped", worker_id);
            });
        }

        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                error!("Reconcile worker panicked: {}", e);
            }
        }
        info!("Controller stopped");
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}

async fn process(reconciler: &Reconciler, queue: &WorkQueue<RequestKey>, key: &RequestKey) {
    match reconciler.reconcile(key).await {
        Ok(outcome) => {
            queue.forget(key);
            if let Some(after) = outcome.requeue_after {
                queue.add_after(key.clone(), after);
            }
        }
        Err(e) if e.is_transient() => {
            warn!("Transient error reconciling {}: {}", key, e);
            queue.add_after(key.clone(), REQUEUE_AFTER);
        }
        Err(e) => {
            error!(
                "Failed to reconcile {} (attempt {}): {}",
                key,
                queue.num_requeues(key) + 1,
                e
            );
            queue.add_rate_limited(key.clone());
        }
    }
}
