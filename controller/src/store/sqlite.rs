// File: controller/src/store/sqlite.rs
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{apply_delete, apply_status, apply_update, prepare_create, Applied, RequestStore};
use crate::clock::{Clock, SystemClock};
use crate::errors::StoreError;
use crate::model::{CollectionRequest, RequestKey};

/// Durable request store backed by SQLite.
///
/// Each row holds the JSON body of one request next to its resource version;
/// writes are compare-and-swap on that column.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            clock: Arc::new(SystemClock),
        };
        store.initialize_tables().await?;

        info!("Request store initialized at {}", database_path);
        Ok(store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn initialize_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_requests (
                kind TEXT NOT NULL,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                resource_version INTEGER NOT NULL,
                body TEXT NOT NULL,
                updated_at DATETIME NOT NULL,
                PRIMARY KEY (kind, namespace, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Request store tables initialized");
        Ok(())
    }

    async fn fetch(&self, key: &RequestKey) -> Result<CollectionRequest, StoreError> {
        let row = sqlx::query(
            "SELECT body FROM collection_requests WHERE kind = ? AND namespace = ? AND name = ?",
        )
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(serde_json::from_str(&body)?)
            }
            None => Err(StoreError::NotFound { key: key.clone() }),
        }
    }

    /// Writes `next` only if the row still holds `expected_version`.
    async fn swap(
        &self,
        key: &RequestKey,
        expected_version: u64,
        next: &CollectionRequest,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(next)?;
        let result = sqlx::query(
            r#"
            UPDATE collection_requests
            SET resource_version = ?, body = ?, updated_at = ?
            WHERE kind = ? AND namespace = ? AND name = ? AND resource_version = ?
            "#,
        )
        .bind(next.metadata.resource_version as i64)
        .bind(body)
        .bind(self.clock.now())
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.lost_race(key, expected_version).await);
        }
        Ok(())
    }

    async fn remove(&self, key: &RequestKey, expected_version: u64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM collection_requests
            WHERE kind = ? AND namespace = ? AND name = ? AND resource_version = ?
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.lost_race(key, expected_version).await);
        }
        debug!("Removed {}", key);
        Ok(())
    }

    /// Explains why a compare-and-swap matched no row.
    async fn lost_race(&self, key: &RequestKey, expected: u64) -> StoreError {
        match self.fetch(key).await {
            Ok(current) => StoreError::Conflict {
                key: key.clone(),
                expected,
                actual: current.metadata.resource_version,
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn get(&self, key: &RequestKey) -> Result<CollectionRequest, StoreError> {
        self.fetch(key).await
    }

    async fn list(&self) -> Result<Vec<CollectionRequest>, StoreError> {
        let rows = sqlx::query("SELECT body FROM collection_requests ORDER BY kind, namespace, name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body).map_err(StoreError::from)
            })
            .collect()
    }

    #[instrument(skip(self, request), fields(name = %request.metadata.name))]
    async fn create(&self, request: CollectionRequest) -> Result<CollectionRequest, StoreError> {
        let key = request.key()?;
        match self.fetch(&key).await {
            Ok(_) => return Err(StoreError::AlreadyExists { key }),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let created = prepare_create(request);
        let body = serde_json::to_string(&created)?;

        let result = sqlx::query(
            r#"
            INSERT INTO collection_requests (kind, namespace, name, resource_version, body, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(created.metadata.resource_version as i64)
        .bind(body)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Created {}", key);
                Ok(created)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::AlreadyExists { key })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, request: &CollectionRequest) -> Result<Option<CollectionRequest>, StoreError> {
        let key = request.key()?;
        let stored = self.fetch(&key).await?;
        let expected = stored.metadata.resource_version;

        match apply_update(&key, &stored, request)? {
            Applied::Replace(next) => {
                self.swap(&key, expected, &next).await?;
                Ok(Some(next))
            }
            Applied::Remove => {
                self.remove(&key, expected).await?;
                Ok(None)
            }
        }
    }

    async fn update_status(&self, request: &CollectionRequest) -> Result<CollectionRequest, StoreError> {
        let key = request.key()?;
        let stored = self.fetch(&key).await?;
        let next = apply_status(&key, &stored, request)?;
        self.swap(&key, stored.metadata.resource_version, &next).await?;
        Ok(next)
    }

    async fn delete(&self, key: &RequestKey) -> Result<Option<CollectionRequest>, StoreError> {
        let stored = self.fetch(key).await?;
        let expected = stored.metadata.resource_version;

        match apply_delete(&stored, self.clock.now()) {
            Applied::Replace(next) => {
                if next.metadata.resource_version != expected {
                    self.swap(key, expected, &next).await?;
                }
                Ok(Some(next))
            }
            Applied::Remove => {
                self.remove(key, expected).await?;
                Ok(None)
            }
        }
    }
}
