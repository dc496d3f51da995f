//! Analytics endpoints.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{DaysParams, LimitParams};
use crate::app_state::AppState;
use crate::error::{ConsoleError, ErrorResponse};
use crate::service::{AnalyticsSummary, DayBucket, Ranked};

/// `GET /analytics`: Summary rollups.
///
/// # Errors
///
/// Returns [`ConsoleError::Store`] when no summary is cached and computing
/// one fails.
#[utoipa::path(
    get,
    path = "/api/v1/analytics",
    tag = "Analytics",
    summary = "Analytics summary",
    description = "Per-day usage over the configured window, today's usage totals, and the most played tracks.",
    responses(
        (status = 200, description = "Summary", body = AnalyticsSummary),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn summary(State(state): State<AppState>) -> Result<Json<AnalyticsSummary>, ConsoleError> {
    Ok(Json(state.console.analytics().await?))
}

/// `GET /analytics/usage-by-day`: Per-day usage.
///
/// # Errors
///
/// Returns [`ConsoleError::Store`] when the read fails.
#[utoipa::path(
    get,
    path = "/api/v1/analytics/usage-by-day",
    tag = "Analytics",
    summary = "Usage by day",
    params(DaysParams),
    responses(
        (status = 200, description = "Buckets, oldest day first", body = Vec<DayBucket>),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn usage_by_day(
    State(state): State<AppState>,
    Query(params): Query<DaysParams>,
) -> Result<Json<Vec<DayBucket>>, ConsoleError> {
    Ok(Json(state.console.usage_by_day(params.clamped()).await?))
}

/// `GET /analytics/top-tracks`: Most played tracks.
///
/// # Errors
///
/// Returns [`ConsoleError::Store`] when the read fails.
#[utoipa::path(
    get,
    path = "/api/v1/analytics/top-tracks",
    tag = "Analytics",
    summary = "Top tracks",
    params(LimitParams),
    responses(
        (status = 200, description = "Tracks by play count", body = Vec<Ranked>),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn top_tracks(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<Ranked>>, ConsoleError> {
    Ok(Json(state.console.top_tracks(params.clamped(5)).await?))
}

/// Analytics routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(summary))
        .route("/analytics/usage-by-day", get(usage_by_day))
        .route("/analytics/top-tracks", get(top_tracks))
}
