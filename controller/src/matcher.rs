//! Target catalogs and selector matching
//!
//! Targets live in two disjoint catalogs (one per [`TargetKind`]). The
//! matcher lists both, skips targets pending deletion, and returns the
//! references of those whose labels satisfy the request's selector.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::errors::ControllerError;
use crate::model::{Target, TargetKind, TargetReference};
use crate::selector::LabelSelector;

#[async_trait]
pub trait TargetCatalog: Send + Sync {
    /// Lists every target of one kind, in a stable order.
    async fn list(&self, kind: TargetKind) -> anyhow::Result<Vec<Target>>;
}

/// In-process catalog, seeded from configuration and mutated through the API.
#[derive(Default)]
pub struct MemoryCatalog {
    targets: RwLock<BTreeMap<TargetReference, Target>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        Self {
            targets: RwLock::new(targets.into_iter().map(|t| (t.reference(), t)).collect()),
        }
    }

    /// Inserts or replaces a target, returning the previous version.
    pub async fn upsert(&self, target: Target) -> Option<Target> {
        let mut targets = self.targets.write().await;
        targets.insert(target.reference(), target)
    }

    pub async fn remove(&self, reference: &TargetReference) -> Option<Target> {
        let mut targets = self.targets.write().await;
        targets.remove(reference)
    }

    pub async fn get(&self, reference: &TargetReference) -> Option<Target> {
        let targets = self.targets.read().await;
        targets.get(reference).cloned()
    }

    pub async fn list_all(&self) -> Vec<Target> {
        let targets = self.targets.read().await;
        targets.values().cloned().collect()
    }
}

#[async_trait]
impl TargetCatalog for MemoryCatalog {
    async fn list(&self, kind: TargetKind) -> anyhow::Result<Vec<Target>> {
        let targets = self.targets.read().await;
        Ok(targets.values().filter(|t| t.kind == kind).cloned().collect())
    }
}

#[derive(Clone)]
pub struct TargetMatcher {
    catalog: Arc<dyn TargetCatalog>,
}

impl TargetMatcher {
    pub fn new(catalog: Arc<dyn TargetCatalog>) -> Self {
        Self { catalog }
    }

    /// Returns the references of all live targets matching `selector`,
    /// catalogs in [`TargetKind::ALL`] order.
    #[instrument(skip(self, selector))]
    pub async fn matching_targets(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<TargetReference>, ControllerError> {
        let parsed = selector.to_selector()?;
        let mut matching = Vec::new();

        for kind in TargetKind::ALL {
            let targets = self
                .catalog
                .list(kind)
                .await
                .map_err(|e| ControllerError::Catalog(format!("listing {}: {}", kind.as_str(), e)))?;

            matching.extend(
                targets
                    .iter()
                    .filter(|t| t.deletion_timestamp.is_none())
                    .filter(|t| parsed.matches(&t.labels))
                    .map(Target::reference),
            );
        }

        debug!("Selector '{}' matched {} targets", parsed, matching.len());
        Ok(matching)
    }
}
