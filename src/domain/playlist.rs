//! User playlists and their tracks. Ordinary owned records with full CRUD
//! from the console; deleting a playlist cascades to its tracks in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A row of `playlists`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Playlist {
    /// Playlist id.
    pub id: Uuid,
    /// Owning Discord user.
    pub user_id: String,
    /// Display name.
    pub playlist_name: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last rename time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A row of `playlist_tracks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlaylistTrack {
    /// Track id.
    pub id: Uuid,
    /// Parent playlist.
    pub playlist_id: Uuid,
    /// Title shown to users.
    pub track_title: String,
    /// Source URL.
    pub track_url: String,
    /// Length in milliseconds; 0 when unknown.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Sort position inside the playlist.
    #[serde(default)]
    pub position: Option<i32>,
    /// Display name of whoever added it.
    #[serde(default)]
    pub added_by: Option<String>,
    /// User id of whoever added it.
    #[serde(default)]
    pub added_by_id: Option<String>,
    /// Insert time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A playlist with its tracks ordered by `position`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PlaylistWithTracks {
    /// The playlist row.
    #[serde(flatten)]
    pub playlist: Playlist,
    /// Its tracks, ascending by position.
    pub tracks: Vec<PlaylistTrack>,
}

/// Fields for a new track; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewPlaylistTrack {
    /// Parent playlist.
    pub playlist_id: Uuid,
    /// Title shown to users.
    pub track_title: String,
    /// Source URL.
    pub track_url: String,
    /// Display name of whoever added it.
    pub added_by: String,
    /// User id of whoever added it.
    pub added_by_id: String,
    /// Length in milliseconds; 0 when unknown.
    pub duration_ms: i64,
    /// Sort position.
    pub position: i32,
}
