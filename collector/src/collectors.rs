//! Built-in collect functions.

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::pool::CollectFn;
use crate::types::{CollectContext, CollectionType};

/// Directory holding every artifact of one request.
pub fn request_dir(storage: &Path, collection_type: CollectionType, request_name: &str) -> PathBuf {
    storage.join(collection_type.as_str()).join(request_name)
}

/// Writes a timestamped JSON manifest describing the collection run.
pub fn manifest_collector(storage: PathBuf, payload: serde_json::Value) -> CollectFn {
    Arc::new(move |context: CollectContext| {
        write_manifest(storage.clone(), payload.clone(), context).boxed()
    })
}

async fn write_manifest(
    storage: PathBuf,
    payload: serde_json::Value,
    context: CollectContext,
) -> anyhow::Result<()> {
    let dir = request_dir(&storage, context.collection_type, &context.request_name);
    tokio::fs::create_dir_all(&dir).await?;

    let collected_at = Utc::now();
    let path = dir.join(format!("{}.json", collected_at.format("%Y%m%d_%H%M%S")));
    let manifest = json!({
        "job_id": context.job_id,
        "request": context.request_name,
        "type": context.collection_type,
        "collected_at": collected_at.to_rfc3339(),
        "payload": payload,
    });
    tokio::fs::write(&path, serde_json::to_vec_pretty(&manifest)?).await?;

    info!("Wrote {} manifest to {}", context.collection_type, path.display());
    Ok(())
}
