// File: controller/src/web/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use collector::{CollectionType, JobInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::errors::StoreError;
use crate::model::{CollectionRequest, RequestKey, RequestSpec, Target, TargetKind, TargetReference};
use crate::predicates::WatchEvent;
use crate::runtime::{apply_target, remove_target};
use crate::selector::Selector;
use crate::web::AppState;

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn api_error(status: StatusCode, message: String) -> ApiError {
    (status, Json(ApiResponse::error(message)))
}

fn store_error(e: StoreError) -> ApiError {
    let status = match &e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::InvalidObject(_) => StatusCode::BAD_REQUEST,
        StoreError::Serialization(_) | StoreError::Database(_) => {
            error!("Request store failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

fn request_key(kind: &str, namespace: &str, name: &str) -> Result<RequestKey, ApiError> {
    let kind = CollectionType::parse(kind).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Unknown collection type '{}'", kind),
        )
    })?;
    Ok(RequestKey::new(kind, namespace, name))
}

#[derive(Debug, Serialize)]
pub struct HealthSummary {
    pub status: String,
    pub queue_depth: usize,
    pub collector_workers: usize,
    pub running_jobs: usize,
    pub clusters: usize,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<HealthSummary> {
    let summary = HealthSummary {
        status: if state.queue.is_shutting_down() {
            "stopping".to_string()
        } else {
            "ok".to_string()
        },
        queue_depth: state.queue.len(),
        collector_workers: state.collector.worker_count(),
        running_jobs: state.collector.get_running_jobs().await.len(),
        clusters: state.catalog.list_all().await.len(),
    };
    Ok(Json(ApiResponse::success(summary)))
}

// === COLLECTION REQUESTS ===

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub kind: CollectionType,
    pub namespace: String,
    pub name: String,
    pub spec: RequestSpec,
}

pub async fn list_requests(State(state): State<AppState>) -> ApiResult<Vec<CollectionRequest>> {
    let requests = state.store.list().await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(requests)))
}

pub async fn get_request(
    Path((kind, namespace, name)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> ApiResult<CollectionRequest> {
    let key = request_key(&kind, &namespace, &name)?;
    let request = state.store.get(&key).await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(request)))
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<CollectionRequest> {
    if let Err(e) = body.spec.cluster_selector.to_selector() {
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }
    if let Err(e) = crate::scheduler::parse_schedule(&body.spec.schedule) {
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let request = CollectionRequest::new(
        body.kind,
        &body.namespace,
        &body.name,
        body.spec,
        state.clock.now(),
    );
    let created = state.store.create(request).await.map_err(store_error)?;

    info!("Created collection request {}/{}", created.metadata.namespace, created.metadata.name);
    state.router.on_request_event(&WatchEvent::Create(created.clone()));
    Ok(Json(ApiResponse::success(created)))
}

pub async fn update_request_spec(
    Path((kind, namespace, name)): Path<(String, String, String)>,
    State(state): State<AppState>,
    Json(spec): Json<RequestSpec>,
) -> ApiResult<CollectionRequest> {
    let key = request_key(&kind, &namespace, &name)?;
    if let Err(e) = spec.cluster_selector.to_selector() {
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }
    if let Err(e) = crate::scheduler::parse_schedule(&spec.schedule) {
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let old = state.store.get(&key).await.map_err(store_error)?;
    if old.metadata.is_deleting() {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("{} is being deleted", key),
        ));
    }

    let mut changed = old.clone();
    changed.spec = spec;
    let updated = state
        .store
        .update(&changed)
        .await
        .map_err(store_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("{} not found", key)))?;

    state.router.on_request_event(&WatchEvent::Update {
        old: Some(old),
        new: updated.clone(),
    });
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_request(
    Path((kind, namespace, name)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> ApiResult<Option<CollectionRequest>> {
    let key = request_key(&kind, &namespace, &name)?;
    let old = state.store.get(&key).await.map_err(store_error)?;

    let remaining = state.store.delete(&key).await.map_err(store_error)?;
    match &remaining {
        Some(marked) => {
            info!("Marked {} for deletion", key);
            state.router.on_request_event(&WatchEvent::Update {
                old: Some(old),
                new: marked.clone(),
            });
        }
        None => {
            info!("Deleted {}", key);
            state.router.on_request_event(&WatchEvent::Delete(old));
        }
    }
    Ok(Json(ApiResponse::success(remaining)))
}

// === TARGET CATALOG ===

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    /// Textual label selector, e.g. `env=prod,tier in (web)`
    pub selector: Option<String>,
}

pub async fn list_targets(
    Query(query): Query<TargetQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Target>> {
    let selector = match query.selector.as_deref() {
        Some(input) => input
            .parse::<Selector>()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        None => Selector::everything(),
    };

    let targets = state
        .catalog
        .list_all()
        .await
        .into_iter()
        .filter(|target| selector.matches(&target.labels))
        .collect();
    Ok(Json(ApiResponse::success(targets)))
}

#[derive(Debug, Serialize)]
pub struct TargetChange {
    pub target: TargetReference,
    pub enqueued_requests: usize,
}

pub async fn upsert_target(
    State(state): State<AppState>,
    Json(target): Json<Target>,
) -> ApiResult<TargetChange> {
    if target.name.is_empty() || target.namespace.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Target needs a namespace and a name".to_string(),
        ));
    }

    let reference = target.reference();
    let enqueued_requests = apply_target(&state.catalog, &state.router, target).await;
    Ok(Json(ApiResponse::success(TargetChange {
        target: reference,
        enqueued_requests,
    })))
}

pub async fn delete_target(
    Path((kind, namespace, name)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> ApiResult<TargetChange> {
    let kind = TargetKind::parse(&kind).ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, format!("Unknown cluster kind '{}'", kind))
    })?;
    let reference = TargetReference::new(kind, &namespace, &name);

    match remove_target(&state.catalog, &state.router, &reference).await {
        Some(enqueued_requests) => Ok(Json(ApiResponse::success(TargetChange {
            target: reference,
            enqueued_requests,
        }))),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("{} not found", reference),
        )),
    }
}

// === INTROSPECTION ===

#[derive(Debug, Serialize)]
pub struct IndexView {
    pub request_to_targets: BTreeMap<String, Vec<String>>,
    pub target_to_requests: BTreeMap<String, Vec<String>>,
    pub consistent: bool,
}

pub async fn get_index(State(state): State<AppState>) -> ApiResult<IndexView> {
    let snapshot = state.index.snapshot().await;
    let view = IndexView {
        consistent: snapshot.is_consistent(),
        request_to_targets: snapshot
            .request_to_targets
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(ToString::to_string).collect()))
            .collect(),
        target_to_requests: snapshot
            .target_to_requests
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(ToString::to_string).collect()))
            .collect(),
    };
    Ok(Json(ApiResponse::success(view)))
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Vec<JobInfo>> {
    Ok(Json(ApiResponse::success(state.collector.list_jobs().await)))
}
