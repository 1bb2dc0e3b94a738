// File: controller/src/web/server.rs
use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, put},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn start_web_server(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        // === COLLECTION REQUEST ROUTES ===
        .route(
            "/api/requests",
            get(handlers::list_requests).post(handlers::create_request),
        )
        .route(
            "/api/requests/{kind}/{namespace}/{name}",
            get(handlers::get_request).delete(handlers::delete_request),
        )
        .route(
            "/api/requests/{kind}/{namespace}/{name}/spec",
            put(handlers::update_request_spec),
        )
        // === TARGET CATALOG ROUTES ===
        .route(
            "/api/targets",
            get(handlers::list_targets).put(handlers::upsert_target),
        )
        .route(
            "/api/targets/{kind}/{namespace}/{name}",
            axum::routing::delete(handlers::delete_target),
        )
        // === INTROSPECTION ROUTES ===
        .route("/api/index", get(handlers::get_index))
        .route("/api/jobs", get(handlers::list_jobs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
