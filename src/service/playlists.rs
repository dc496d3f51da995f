//! Playlist management. Ordinary CRUD on console-writable tables.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{NewPlaylistTrack, Playlist, PlaylistTrack, PlaylistWithTracks};
use crate::error::{ConsoleError, StoreError};
use crate::store::{ReadQuery, Row, Table, TelemetryStore, decode_row, to_row};

const DEFAULT_ADDED_BY: &str = "Admin";
const DEFAULT_ADDED_BY_ID: &str = "admin";

/// A track to append; omitted fields take console defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct TrackDraft {
    /// Title shown to users.
    pub track_title: String,
    /// Source URL.
    pub track_url: String,
    /// Length in milliseconds (default 0).
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Sort position (default 0).
    #[serde(default)]
    pub position: Option<i32>,
    /// Display name of the adder (default `Admin`).
    #[serde(default)]
    pub added_by: Option<String>,
    /// User id of the adder (default `admin`).
    #[serde(default)]
    pub added_by_id: Option<String>,
}

/// Reads and edits playlists and their tracks.
#[derive(Debug, Clone)]
pub struct PlaylistService {
    store: TelemetryStore,
}

impl PlaylistService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: TelemetryStore) -> Self {
        Self { store }
    }

    /// Lists playlists, newest first, optionally filtered by a substring of
    /// the owner's user id. Tracks come ascending by position; a playlist
    /// whose tracks cannot be read is listed with none.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsoleError::Store`] when the playlist read fails.
    pub async fn list(&self, user: Option<&str>) -> Result<Vec<PlaylistWithTracks>, ConsoleError> {
        let mut query = ReadQuery::new().newest_first("created_at");
        if let Some(user) = user.map(str::trim).filter(|u| !u.is_empty()) {
            query = query.contains("user_id", user);
        }
        let playlists: Vec<Playlist> = self.store.fetch(Table::Playlists, &query).await?;

        let mut listed = Vec::with_capacity(playlists.len());
        for playlist in playlists {
            let tracks = match self.tracks(playlist.id).await {
                Ok(tracks) => tracks,
                Err(err) => {
                    tracing::warn!(playlist_id = %playlist.id, error = %err, "failed to load tracks");
                    Vec::new()
                }
            };
            listed.push(PlaylistWithTracks { playlist, tracks });
        }
        Ok(listed)
    }

    async fn tracks(&self, playlist_id: Uuid) -> Result<Vec<PlaylistTrack>, ConsoleError> {
        Ok(self
            .store
            .fetch(
                Table::PlaylistTracks,
                &ReadQuery::new()
                    .eq("playlist_id", playlist_id.to_string())
                    .oldest_first("position"),
            )
            .await?)
    }

    /// Renames a playlist.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::InvalidRequest`] for a blank name,
    /// [`ConsoleError::NotFound`] for an unknown id, or a store error.
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Playlist, ConsoleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConsoleError::InvalidRequest("playlist_name is empty".to_string()));
        }
        let patch = patch(json!({
            "playlist_name": name,
            "updated_at": Utc::now(),
        }))?;
        let row = self
            .store
            .update(Table::Playlists, &id.to_string(), patch)
            .await
            .map_err(not_found_as("playlist", id))?;
        decoded(Table::Playlists, row)
    }

    /// Deletes a playlist; its tracks go with it.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotFound`] for an unknown id, or a store error.
    pub async fn delete(&self, id: Uuid) -> Result<(), ConsoleError> {
        self.store
            .delete(Table::Playlists, &id.to_string())
            .await
            .map_err(not_found_as("playlist", id))?;
        tracing::info!(playlist_id = %id, "playlist deleted");
        Ok(())
    }

    /// Appends a track to a playlist.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::InvalidRequest`] for a blank title or URL, or a store
    /// error.
    pub async fn add_track(&self, playlist_id: Uuid, draft: TrackDraft) -> Result<PlaylistTrack, ConsoleError> {
        let title = draft.track_title.trim();
        let url = draft.track_url.trim();
        if title.is_empty() || url.is_empty() {
            return Err(ConsoleError::InvalidRequest(
                "track_title and track_url are required".to_string(),
            ));
        }
        let track = NewPlaylistTrack {
            playlist_id,
            track_title: title.to_string(),
            track_url: url.to_string(),
            added_by: draft.added_by.unwrap_or_else(|| DEFAULT_ADDED_BY.to_string()),
            added_by_id: draft.added_by_id.unwrap_or_else(|| DEFAULT_ADDED_BY_ID.to_string()),
            duration_ms: draft.duration_ms.unwrap_or(0),
            position: draft.position.unwrap_or(0),
        };
        let row = self.store.insert(Table::PlaylistTracks, &track).await?;
        decoded(Table::PlaylistTracks, row)
    }

    /// Changes a track's title.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::InvalidRequest`] for a blank title,
    /// [`ConsoleError::NotFound`] for an unknown id, or a store error.
    pub async fn update_track_title(&self, id: Uuid, title: &str) -> Result<PlaylistTrack, ConsoleError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ConsoleError::InvalidRequest("track_title is empty".to_string()));
        }
        let row = self
            .store
            .update(
                Table::PlaylistTracks,
                &id.to_string(),
                patch(json!({ "track_title": title }))?,
            )
            .await
            .map_err(not_found_as("track", id))?;
        decoded(Table::PlaylistTracks, row)
    }

    /// Deletes a track.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotFound`] for an unknown id, or a store error.
    pub async fn delete_track(&self, id: Uuid) -> Result<(), ConsoleError> {
        self.store
            .delete(Table::PlaylistTracks, &id.to_string())
            .await
            .map_err(not_found_as("track", id))
    }
}

fn patch(value: Value) -> Result<Row, ConsoleError> {
    Ok(to_row(&value)?)
}

fn decoded<T: serde::de::DeserializeOwned>(table: Table, row: Row) -> Result<T, ConsoleError> {
    decode_row(table, row)
        .ok_or_else(|| ConsoleError::Internal(format!("{table} row did not decode")))
}

fn not_found_as(what: &'static str, id: Uuid) -> impl Fn(StoreError) -> ConsoleError {
    move |err| {
        if err.code.as_deref() == Some("not_found") {
            ConsoleError::NotFound(format!("{what} {id}"))
        } else {
            ConsoleError::Store(err)
        }
    }
}
