// File: controller/src/store/memory.rs
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{apply_delete, apply_status, apply_update, prepare_create, Applied, RequestStore};
use crate::clock::{Clock, SystemClock};
use crate::errors::StoreError;
use crate::model::{CollectionRequest, RequestKey};

/// In-process request store for tests and ephemeral runs.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<RequestKey, CollectionRequest>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn get(&self, key: &RequestKey) -> Result<CollectionRequest, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    async fn list(&self) -> Result<Vec<CollectionRequest>, StoreError> {
        Ok(self.objects.read().await.values().cloned().collect())
    }

    #[instrument(skip(self, request), fields(name = %request.metadata.name))]
    async fn create(&self, request: CollectionRequest) -> Result<CollectionRequest, StoreError> {
        let key = request.key()?;

        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { key });
        }

        let created = prepare_create(request);
        objects.insert(key.clone(), created.clone());
        debug!("Created {}", key);
        Ok(created)
    }

    async fn update(&self, request: &CollectionRequest) -> Result<Option<CollectionRequest>, StoreError> {
        let key = request.key()?;
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        match apply_update(&key, stored, request)? {
            Applied::Replace(next) => {
                objects.insert(key, next.clone());
                Ok(Some(next))
            }
            Applied::Remove => {
                objects.remove(&key);
                debug!("Removed {} after its last finalizer was released", key);
                Ok(None)
            }
        }
    }

    async fn update_status(&self, request: &CollectionRequest) -> Result<CollectionRequest, StoreError> {
        let key = request.key()?;
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        let next = apply_status(&key, stored, request)?;
        objects.insert(key, next.clone());
        Ok(next)
    }

    async fn delete(&self, key: &RequestKey) -> Result<Option<CollectionRequest>, StoreError> {
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        match apply_delete(stored, self.clock.now()) {
            Applied::Replace(next) => {
                objects.insert(key.clone(), next.clone());
                Ok(Some(next))
            }
            Applied::Remove => {
                objects.remove(key);
                Ok(None)
            }
        }
    }
}
