//! Seam between the reconciler and the collector pool.

use async_trait::async_trait;
use collector::{manifest_collector, CollectFn, CollectionResult, CollectionType, Collector};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::errors::ControllerError;
use crate::model::CollectionRequest;

/// Builds the collect function run for a request when it is due.
pub type JobFactory = Arc<dyn Fn(&CollectionRequest) -> CollectFn + Send + Sync>;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Queues a collection job. Returns `false` when one is already outstanding.
    async fn submit(
        &self,
        request_name: &str,
        collection_type: CollectionType,
        collect: CollectFn,
    ) -> Result<bool, ControllerError>;

    async fn last_result(&self, request_name: &str, collection_type: CollectionType) -> CollectionResult;

    /// Cancels outstanding work and removes stored artifacts.
    async fn purge_all(
        &self,
        storage: &str,
        request_name: &str,
        collection_type: CollectionType,
    ) -> Result<(), ControllerError>;
}

pub struct CollectorDispatcher {
    collector: Arc<Collector>,
}

impl CollectorDispatcher {
    pub fn new(collector: Arc<Collector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl Dispatcher for CollectorDispatcher {
    async fn submit(
        &self,
        request_name: &str,
        collection_type: CollectionType,
        collect: CollectFn,
    ) -> Result<bool, ControllerError> {
        let queued = self.collector.collect(request_name, collection_type, collect).await?;
        if !queued {
            debug!("{} job for {} already outstanding", collection_type, request_name);
        }
        Ok(queued)
    }

    async fn last_result(&self, request_name: &str, collection_type: CollectionType) -> CollectionResult {
        self.collector.get_result(request_name, collection_type).await
    }

    async fn purge_all(
        &self,
        storage: &str,
        request_name: &str,
        collection_type: CollectionType,
    ) -> Result<(), ControllerError> {
        self.collector
            .cleanup_entries(Path::new(storage), request_name, collection_type)
            .await?;
        Ok(())
    }
}

/// Default job: a manifest listing the clusters matched at dispatch time.
pub fn manifest_job_factory() -> JobFactory {
    Arc::new(|request: &CollectionRequest| {
        let payload = json!({
            "namespace": request.metadata.namespace,
            "name": request.metadata.name,
            "schedule": request.spec.schedule,
            "clusters": request.status.matching_cluster_refs,
        });
        manifest_collector(PathBuf::from(&request.spec.storage), payload)
    })
}
