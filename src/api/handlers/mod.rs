//! REST endpoint handlers organized by resource.

pub mod analytics;
pub mod commands;
pub mod infra;
pub mod playlists;
pub mod system;
pub mod telemetry;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::routes())
        .merge(telemetry::routes())
        .merge(analytics::routes())
        .merge(commands::routes())
        .merge(playlists::routes())
        .merge(infra::routes())
}
