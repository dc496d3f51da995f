//! Hosting control plane endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::control_plane::{RedeployOutcome, ServiceStatus};
use crate::error::{ConsoleError, ErrorResponse};

/// `GET /infra/status`: Worker service status.
///
/// # Errors
///
/// Returns [`ConsoleError::Configuration`] without credentials, or the
/// control plane's error.
#[utoipa::path(
    get,
    path = "/api/v1/infra/status",
    tag = "Infra",
    summary = "Service status",
    responses(
        (status = 200, description = "Current deployment", body = ServiceStatus),
        (status = 500, description = "Control plane not configured", body = ErrorResponse),
        (status = 502, description = "Control plane unreachable", body = ErrorResponse),
    )
)]
pub async fn status(State(state): State<AppState>) -> Result<Json<ServiceStatus>, ConsoleError> {
    Ok(Json(state.console.infra_status().await?))
}

/// `POST /infra/redeploy`: Redeploy the worker.
///
/// # Errors
///
/// Returns [`ConsoleError::Configuration`] without credentials, or the
/// control plane's error.
#[utoipa::path(
    post,
    path = "/api/v1/infra/redeploy",
    tag = "Infra",
    summary = "Redeploy",
    responses(
        (status = 200, description = "Redeploy triggered", body = RedeployOutcome),
        (status = 500, description = "Control plane not configured", body = ErrorResponse),
        (status = 502, description = "Control plane unreachable", body = ErrorResponse),
    )
)]
pub async fn redeploy(State(state): State<AppState>) -> Result<Json<RedeployOutcome>, ConsoleError> {
    let outcome = state.console.redeploy().await?;
    tracing::info!(success = outcome.success, "redeploy requested");
    Ok(Json(outcome))
}

/// Infra routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/infra/status", get(status))
        .route("/infra/redeploy", post(redeploy))
}
