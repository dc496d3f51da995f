//! Telemetry reads, served from the reconciled views.
//!
//! These never touch the store, so a store outage shows up as stale data,
//! not as errors.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{LimitParams, SessionView};
use crate::app_state::AppState;
use crate::domain::{BotLogEntry, PlaybackRecord, SystemStatsSample, UsageRecord};

const DEFAULT_LOG_LIMIT: usize = 50;
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// `GET /stats/latest`: Latest worker sample.
#[utoipa::path(
    get,
    path = "/api/v1/stats/latest",
    tag = "Telemetry",
    summary = "Latest system stats",
    description = "Returns the newest stats sample seen by push or poll, or `null` before the first one arrives.",
    responses(
        (status = 200, description = "Latest sample", body = Option<SystemStatsSample>),
    )
)]
pub async fn latest_stats(State(state): State<AppState>) -> Json<Option<SystemStatsSample>> {
    Json(state.console.latest_stats().await)
}

/// `GET /sessions`: Active playback sessions.
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Telemetry",
    summary = "Active sessions",
    responses(
        (status = 200, description = "Sessions, most recently updated first", body = Vec<SessionView>),
    )
)]
pub async fn sessions(State(state): State<AppState>) -> Json<Vec<SessionView>> {
    Json(state.console.sessions().into_iter().map(SessionView::from).collect())
}

/// `GET /logs`: Live log tail.
#[utoipa::path(
    get,
    path = "/api/v1/logs",
    tag = "Telemetry",
    summary = "Worker logs",
    params(LimitParams),
    responses(
        (status = 200, description = "Newest log lines first", body = Vec<BotLogEntry>),
    )
)]
pub async fn logs(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Json<Vec<BotLogEntry>> {
    Json(state.console.logs(params.clamped(DEFAULT_LOG_LIMIT)))
}

/// `GET /usage`: Recent chat-model usage.
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "Telemetry",
    summary = "Chat-model usage",
    params(LimitParams),
    responses(
        (status = 200, description = "Newest calls first", body = Vec<UsageRecord>),
    )
)]
pub async fn usage(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Json<Vec<UsageRecord>> {
    Json(state.console.usage(params.clamped(DEFAULT_HISTORY_LIMIT)))
}

/// `GET /playback`: Recent playback history.
#[utoipa::path(
    get,
    path = "/api/v1/playback",
    tag = "Telemetry",
    summary = "Playback history",
    params(LimitParams),
    responses(
        (status = 200, description = "Newest plays first", body = Vec<PlaybackRecord>),
    )
)]
pub async fn playback(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Json<Vec<PlaybackRecord>> {
    Json(state.console.playback(params.clamped(DEFAULT_HISTORY_LIMIT)))
}

/// Telemetry routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats/latest", get(latest_stats))
        .route("/sessions", get(sessions))
        .route("/logs", get(logs))
        .route("/usage", get(usage))
        .route("/playback", get(playback))
}
