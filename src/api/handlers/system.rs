//! System endpoints: health check, store diagnostics and the observed
//! resource catalog.

use axum::http::StatusCode;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::Resource;
use crate::service::Diagnostics;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /diagnostics`: Store connectivity report.
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    tag = "System",
    summary = "Store diagnostics",
    description = "Reads one row from every table and reports each result or store error, plus which store and control-plane settings are present.",
    responses(
        (status = 200, description = "Every table is reachable", body = Diagnostics),
        (status = 503, description = "At least one table failed", body = Diagnostics),
    )
)]
pub async fn diagnostics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.console.diagnostics().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// One observed resource and its staleness bound.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceInfo {
    resource: Resource,
    poll_interval_secs: u64,
    pushed: bool,
}

/// `GET /resources`: List observed resources.
#[utoipa::path(
    get,
    path = "/api/v1/resources",
    tag = "System",
    summary = "List observed resources",
    description = "Returns every resource the console keeps current, its poll interval, and whether change notifications also feed it.",
    responses(
        (status = 200, description = "Resource catalog", body = Vec<ResourceInfo>),
    )
)]
pub async fn resources_handler() -> impl IntoResponse {
    let resources: Vec<ResourceInfo> = Resource::ALL
        .into_iter()
        .map(|resource| ResourceInfo {
            resource,
            poll_interval_secs: resource.poll_interval().as_secs(),
            pushed: crate::service::console::push_source(resource).is_some(),
        })
        .collect();
    (StatusCode::OK, Json(resources))
}

/// System routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .route("/resources", get(resources_handler))
}
