//! Persistence of collection requests.
//!
//! Both backends implement the same object semantics:
//!
//! - every write carries the caller's `resource_version` and fails with
//!   [`StoreError::Conflict`] when it is stale; successful writes bump it
//! - `update` replaces metadata and spec but never status, and bumps
//!   `generation` when the spec changed
//! - `update_status` replaces status only
//! - `delete` marks the object with a deletion timestamp while finalizers
//!   remain, and an `update` that removes the last finalizer of a deleting
//!   object removes it for good

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::model::{CollectionRequest, RequestKey};

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(&self, key: &RequestKey) -> Result<CollectionRequest, StoreError>;

    async fn list(&self) -> Result<Vec<CollectionRequest>, StoreError>;

    async fn create(&self, request: CollectionRequest) -> Result<CollectionRequest, StoreError>;

    /// Returns `None` when the write completed a pending deletion.
    async fn update(&self, request: &CollectionRequest) -> Result<Option<CollectionRequest>, StoreError>;

    async fn update_status(&self, request: &CollectionRequest) -> Result<CollectionRequest, StoreError>;

    /// Returns the object still held back by finalizers, or `None` when it is gone.
    async fn delete(&self, key: &RequestKey) -> Result<Option<CollectionRequest>, StoreError>;
}

/// Result of applying a write to the stored object.
#[derive(Debug)]
pub(crate) enum Applied {
    Replace(CollectionRequest),
    Remove,
}

fn check_version(
    key: &RequestKey,
    stored: &CollectionRequest,
    incoming: &CollectionRequest,
) -> Result<(), StoreError> {
    if stored.metadata.resource_version != incoming.metadata.resource_version {
        return Err(StoreError::Conflict {
            key: key.clone(),
            expected: incoming.metadata.resource_version,
            actual: stored.metadata.resource_version,
        });
    }
    Ok(())
}

pub(crate) fn prepare_create(mut request: CollectionRequest) -> CollectionRequest {
    request.metadata.resource_version = 1;
    request.metadata.generation = 1;
    request.metadata.deletion_timestamp = None;
    request
}

pub(crate) fn apply_update(
    key: &RequestKey,
    stored: &CollectionRequest,
    incoming: &CollectionRequest,
) -> Result<Applied, StoreError> {
    check_version(key, stored, incoming)?;

    let mut next = stored.clone();
    next.metadata.finalizers = incoming.metadata.finalizers.clone();
    if next.metadata.deletion_timestamp.is_none() {
        next.metadata.deletion_timestamp = incoming.metadata.deletion_timestamp;
    }
    if next.spec != incoming.spec {
        next.spec = incoming.spec.clone();
        next.metadata.generation += 1;
    }

    if next.metadata.is_deleting() && next.metadata.finalizers.is_empty() {
        return Ok(Applied::Remove);
    }

    next.metadata.resource_version += 1;
    Ok(Applied::Replace(next))
}

pub(crate) fn apply_status(
    key: &RequestKey,
    stored: &CollectionRequest,
    incoming: &CollectionRequest,
) -> Result<CollectionRequest, StoreError> {
    check_version(key, stored, incoming)?;

    let mut next = stored.clone();
    next.status = incoming.status.clone();
    next.metadata.resource_version += 1;
    Ok(next)
}

pub(crate) fn apply_delete(stored: &CollectionRequest, now: DateTime<Utc>) -> Applied {
    if stored.metadata.finalizers.is_empty() {
        return Applied::Remove;
    }

    let mut next = stored.clone();
    if next.metadata.deletion_timestamp.is_none() {
        next.metadata.deletion_timestamp = Some(now);
        next.metadata.resource_version += 1;
    }
    Applied::Replace(next)
}
