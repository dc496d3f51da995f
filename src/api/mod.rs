//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All endpoints are mounted under `/api/v1`. The OpenAPI document is served
//! at `/api-docs/openapi.json`, with Swagger UI at `/swagger-ui` when the
//! `swagger-ui` feature is enabled.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "bot-console", description = "Operator console for a remote chat/music bot"),
    paths(
        handlers::system::health_handler,
        handlers::system::diagnostics_handler,
        handlers::system::resources_handler,
        handlers::telemetry::latest_stats,
        handlers::telemetry::sessions,
        handlers::telemetry::logs,
        handlers::telemetry::usage,
        handlers::telemetry::playback,
        handlers::analytics::summary,
        handlers::analytics::usage_by_day,
        handlers::analytics::top_tracks,
        handlers::commands::dispatch,
        handlers::commands::control_session,
        handlers::commands::get_command,
        handlers::playlists::list_playlists,
        handlers::playlists::rename_playlist,
        handlers::playlists::delete_playlist,
        handlers::playlists::add_track,
        handlers::playlists::update_track,
        handlers::playlists::delete_track,
        handlers::infra::status,
        handlers::infra::redeploy,
    ),
    tags(
        (name = "System", description = "Health, diagnostics and resource catalog"),
        (name = "Telemetry", description = "Reconciled worker telemetry"),
        (name = "Analytics", description = "Usage and playback rollups"),
        (name = "Commands", description = "Command queue"),
        (name = "Playlists", description = "Playlist management"),
        (name = "Infra", description = "Hosting control plane"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(docs_router())
}

#[cfg(feature = "swagger-ui")]
fn docs_router() -> Router<AppState> {
    Router::new().merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_router() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
