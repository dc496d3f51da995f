//! Playlist DTOs.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// `?user=` filter on the playlist list.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PlaylistFilter {
    /// Case-insensitive substring of the owner's user id.
    #[serde(default)]
    pub user: Option<String>,
}

/// Request body for `PATCH /playlists/{id}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RenamePlaylistRequest {
    /// New display name.
    pub playlist_name: String,
}

/// Request body for `PATCH /tracks/{id}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTrackRequest {
    /// New title.
    pub track_title: String,
}
