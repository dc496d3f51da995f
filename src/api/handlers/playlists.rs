//! Playlist CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{PlaylistFilter, RenamePlaylistRequest, UpdateTrackRequest};
use crate::app_state::AppState;
use crate::domain::{Playlist, PlaylistTrack, PlaylistWithTracks};
use crate::error::{ConsoleError, ErrorResponse};
use crate::service::TrackDraft;

/// `GET /playlists`: Playlists with their tracks.
///
/// # Errors
///
/// Returns [`ConsoleError::Store`] when a read is needed and fails.
#[utoipa::path(
    get,
    path = "/api/v1/playlists",
    tag = "Playlists",
    summary = "List playlists",
    params(PlaylistFilter),
    responses(
        (status = 200, description = "Playlists, newest first", body = Vec<PlaylistWithTracks>),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn list_playlists(
    State(state): State<AppState>,
    Query(filter): Query<PlaylistFilter>,
) -> Result<Json<Vec<PlaylistWithTracks>>, ConsoleError> {
    Ok(Json(state.console.playlists(filter.user.as_deref()).await?))
}

/// `PATCH /playlists/{id}`: Rename a playlist.
///
/// # Errors
///
/// Returns [`ConsoleError::InvalidRequest`] for an empty name,
/// [`ConsoleError::NotFound`] for an unknown id, or a store error.
#[utoipa::path(
    patch,
    path = "/api/v1/playlists/{id}",
    tag = "Playlists",
    summary = "Rename a playlist",
    params(("id" = Uuid, Path, description = "Playlist id")),
    request_body = RenamePlaylistRequest,
    responses(
        (status = 200, description = "Renamed playlist", body = Playlist),
        (status = 404, description = "Unknown playlist", body = ErrorResponse),
    )
)]
pub async fn rename_playlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RenamePlaylistRequest>,
) -> Result<Json<Playlist>, ConsoleError> {
    Ok(Json(state.console.rename_playlist(id, &req.playlist_name).await?))
}

/// `DELETE /playlists/{id}`: Delete a playlist and its tracks.
///
/// # Errors
///
/// Returns [`ConsoleError::NotFound`] for an unknown id, or a store error.
#[utoipa::path(
    delete,
    path = "/api/v1/playlists/{id}",
    tag = "Playlists",
    summary = "Delete a playlist",
    params(("id" = Uuid, Path, description = "Playlist id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown playlist", body = ErrorResponse),
    )
)]
pub async fn delete_playlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ConsoleError> {
    state.console.delete_playlist(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /playlists/{id}/tracks`: Append a track.
///
/// # Errors
///
/// Returns [`ConsoleError::InvalidRequest`] for a missing title or URL, or a
/// store error.
#[utoipa::path(
    post,
    path = "/api/v1/playlists/{id}/tracks",
    tag = "Playlists",
    summary = "Add a track",
    params(("id" = Uuid, Path, description = "Playlist id")),
    request_body = TrackDraft,
    responses(
        (status = 201, description = "Track added", body = PlaylistTrack),
        (status = 400, description = "Invalid track", body = ErrorResponse),
    )
)]
pub async fn add_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<TrackDraft>,
) -> Result<impl IntoResponse, ConsoleError> {
    let track = state.console.add_track(id, draft).await?;
    Ok((StatusCode::CREATED, Json(track)))
}

/// `PATCH /tracks/{id}`: Rename a track.
///
/// # Errors
///
/// Returns [`ConsoleError::NotFound`] for an unknown id, or a store error.
#[utoipa::path(
    patch,
    path = "/api/v1/tracks/{id}",
    tag = "Playlists",
    summary = "Rename a track",
    params(("id" = Uuid, Path, description = "Track id")),
    request_body = UpdateTrackRequest,
    responses(
        (status = 200, description = "Updated track", body = PlaylistTrack),
        (status = 404, description = "Unknown track", body = ErrorResponse),
    )
)]
pub async fn update_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTrackRequest>,
) -> Result<Json<PlaylistTrack>, ConsoleError> {
    Ok(Json(state.console.update_track_title(id, &req.track_title).await?))
}

/// `DELETE /tracks/{id}`: Remove a track.
///
/// # Errors
///
/// Returns [`ConsoleError::NotFound`] for an unknown id, or a store error.
#[utoipa::path(
    delete,
    path = "/api/v1/tracks/{id}",
    tag = "Playlists",
    summary = "Delete a track",
    params(("id" = Uuid, Path, description = "Track id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown track", body = ErrorResponse),
    )
)]
pub async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ConsoleError> {
    state.console.delete_track(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Playlist routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/playlists", get(list_playlists))
        .route("/playlists/{id}", patch(rename_playlist).delete(delete_playlist))
        .route("/playlists/{id}/tracks", post(add_track))
        .route("/tracks/{id}", patch(update_track).delete(delete_track))
}
