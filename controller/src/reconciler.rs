//! Per-request reconciliation.
//!
//! A request is either live or terminating. Live requests get their
//! finalizer, matched targets, reverse-index entry, folded job result and
//! schedule refreshed on every pass; terminating requests have their
//! collector state purged before the finalizer is released.

use collector::CollectionResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::constants::scheduling::REQUEUE_AFTER;
use crate::dispatcher::{Dispatcher, JobFactory};
use crate::errors::ControllerError;
use crate::index::ReverseIndex;
use crate::matcher::TargetMatcher;
use crate::model::{CollectionRequest, CollectionStatus, RequestKey};
use crate::scheduler::{self, Collection};
use crate::store::RequestStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn done() -> Self {
        Self { requeue_after: None }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn RequestStore>,
    matcher: TargetMatcher,
    index: Arc<ReverseIndex>,
    dispatcher: Arc<dyn Dispatcher>,
    jobs: JobFactory,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RequestStore>,
        matcher: TargetMatcher,
        index: Arc<ReverseIndex>,
        dispatcher: Arc<dyn Dispatcher>,
        jobs: JobFactory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            matcher,
            index,
            dispatcher,
            jobs,
            clock,
        }
    }

    pub fn index(&self) -> &Arc<ReverseIndex> {
        &self.index
    }

    #[instrument(skip(self), fields(request = %key))]
    pub async fn reconcile(&self, key: &RequestKey) -> Result<ReconcileOutcome, ControllerError> {
        let request = match self.store.get(key).await {
            Ok(request) => request,
            Err(e) if e.is_not_found() => {
                debug!("Request no longer exists, dropping it from the index");
                self.index.remove(key).await;
                return Ok(ReconcileOutcome::done());
            }
            Err(e) => return Err(e.into()),
        };

        if request.metadata.is_deleting() {
            self.reconcile_delete(key, request).await
        } else {
            self.reconcile_normal(key, request).await
        }
    }

    async fn reconcile_delete(
        &self,
        key: &RequestKey,
        mut request: CollectionRequest,
    ) -> Result<ReconcileOutcome, ControllerError> {
        info!("Reconciling deletion");

        let finalizer = request.finalizer();
        if request.metadata.has_finalizer(finalizer) {
            self.dispatcher
                .purge_all(&request.spec.storage, &key.job_name(), key.kind)
                .await?;

            request.metadata.remove_finalizer(finalizer);
            match self.store.update(&request).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.index.remove(key).await;
        info!("Reconcile delete success");
        Ok(ReconcileOutcome::done())
    }

    async fn reconcile_normal(
        &self,
        key: &RequestKey,
        mut request: CollectionRequest,
    ) -> Result<ReconcileOutcome, ControllerError> {
        debug!("Reconciling");

        let finalizer = request.finalizer();
        if !request.metadata.has_finalizer(finalizer) {
            request.metadata.add_finalizer(finalizer);
            request = match self.store.update(&request).await? {
                Some(updated) => updated,
                None => return Ok(ReconcileOutcome::done()),
            };
        }

        let selector = request.spec.cluster_selector.to_selector()?;
        let targets = self
            .matcher
            .matching_targets(&request.spec.cluster_selector)
            .await?;
        self.index.update(key, selector, &targets).await;
        request.status.matching_cluster_refs = targets;

        let job_name = key.job_name();
        let result = self.dispatcher.last_result(&job_name, key.kind).await;
        fold_result(&mut request, &result);

        let now = self.clock.now();
        let jobs = self.jobs.clone();
        let snapshot = request.clone();
        let next_run = scheduler::schedule(
            &mut request,
            self.dispatcher.as_ref(),
            &job_name,
            key.kind,
            move || jobs(&snapshot),
            now,
        )
        .await?;

        if let Err(e) = self.store.update_status(&request).await {
            warn!("Failed to update status: {}", e);
            return Ok(ReconcileOutcome::requeue(REQUEUE_AFTER));
        }

        if request.status.last_run_status == Some(CollectionStatus::InProgress) {
            debug!("Collection in progress, polling again in {:?}", REQUEUE_AFTER);
            return Ok(ReconcileOutcome::requeue(REQUEUE_AFTER));
        }

        let delay = (next_run - now).to_std().unwrap_or(Duration::ZERO);
        debug!("Next run at {}, requeue in {:?}", next_run, delay);
        Ok(ReconcileOutcome::requeue(delay))
    }
}

/// Maps the collector's last result onto the request status.
pub fn fold_result<C: Collection>(collection: &mut C, result: &CollectionResult) {
    match result {
        CollectionResult::Unavailable => {}
        CollectionResult::InProgress => {
            collection.set_last_run_status(CollectionStatus::InProgress);
            collection.set_failure_message(String::new());
        }
        CollectionResult::Collected => {
            collection.set_last_run_status(CollectionStatus::Collected);
            collection.set_failure_message(String::new());
        }
        CollectionResult::Failed(message) => {
            collection.set_last_run_status(CollectionStatus::Failed);
            collection.set_failure_message(message.clone());
        }
    }
}
