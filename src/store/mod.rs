//! Typed access to the shared durable store.
//!
//! [`StoreBackend`] is the seam: [`PostgresStore`] talks to the real
//! database, [`MemoryStore`] is an in-process fake for tests and local
//! runs. [`TelemetryStore`] is the explicitly constructed client the rest of
//! the console receives; it adds typed decoding, the console's write
//! allowlist, and access to the change feed.

pub mod memory;
pub mod postgres;
pub mod query;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use query::{CompareOp, Direction, Filter, Order, ReadQuery};

use crate::error::StoreError;
use crate::feed::{ChangeFeed, EventMask, Subscription};

/// A row as it crosses the store boundary: a JSON object keyed by column.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// How a table's key is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `bigint` identity assigned by the store.
    Serial,
    /// UUID, assigned by the store when the writer omits it.
    Uuid,
    /// Natural key supplied by the writer.
    Natural,
}

/// Tables of the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Worker process samples.
    SystemStats,
    /// Guild playback sessions.
    ActiveSessions,
    /// Worker log lines.
    BotLogs,
    /// Chat-model usage.
    GeminiUsage,
    /// Played tracks.
    MusicHistory,
    /// Console → worker commands.
    CommandQueue,
    /// User playlists.
    Playlists,
    /// Playlist children.
    PlaylistTracks,
}

impl Table {
    /// Every table.
    pub const ALL: [Self; 8] = [
        Self::SystemStats,
        Self::ActiveSessions,
        Self::BotLogs,
        Self::GeminiUsage,
        Self::MusicHistory,
        Self::CommandQueue,
        Self::Playlists,
        Self::PlaylistTracks,
    ];

    /// SQL table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SystemStats => "system_stats",
            Self::ActiveSessions => "active_sessions",
            Self::BotLogs => "bot_logs",
            Self::GeminiUsage => "gemini_usage",
            Self::MusicHistory => "music_history",
            Self::CommandQueue => "command_queue",
            Self::Playlists => "playlists",
            Self::PlaylistTracks => "playlist_tracks",
        }
    }

    /// Looks a table up by SQL name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Primary key column.
    #[must_use]
    pub const fn key_column(self) -> &'static str {
        match self {
            Self::ActiveSessions => "guild_id",
            _ => "id",
        }
    }

    /// How the key is produced.
    #[must_use]
    pub const fn key_kind(self) -> KeyKind {
        match self {
            Self::ActiveSessions => KeyKind::Natural,
            Self::CommandQueue | Self::Playlists | Self::PlaylistTracks => KeyKind::Uuid,
            Self::SystemStats | Self::BotLogs | Self::GeminiUsage | Self::MusicHistory => {
                KeyKind::Serial
            }
        }
    }

    /// Timestamp column the store fills on insert.
    #[must_use]
    pub const fn stamp_column(self) -> &'static str {
        match self {
            Self::SystemStats | Self::GeminiUsage | Self::MusicHistory => "recorded_at",
            Self::ActiveSessions => "updated_at",
            Self::BotLogs | Self::CommandQueue | Self::Playlists | Self::PlaylistTracks => {
                "created_at"
            }
        }
    }

    /// Whether an update trigger maintains `updated_at`.
    #[must_use]
    pub const fn touches_updated_at(self) -> bool {
        matches!(self, Self::ActiveSessions | Self::CommandQueue | Self::Playlists)
    }

    /// Column allowlist.
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::SystemStats => &[
                "id",
                "cpu_usage",
                "ram_rss",
                "ram_heap",
                "ping_gateway",
                "ping_lavalink",
                "guild_count",
                "uptime",
                "status",
                "recorded_at",
            ],
            Self::ActiveSessions => &[
                "guild_id",
                "track_title",
                "position_ms",
                "duration_ms",
                "is_playing",
                "voice_members_count",
                "updated_at",
            ],
            Self::BotLogs => &["id", "level", "message", "scope", "created_at"],
            Self::GeminiUsage => &[
                "id",
                "guild_id",
                "user_id",
                "prompt_tokens",
                "completion_tokens",
                "total_tokens",
                "model",
                "recorded_at",
            ],
            Self::MusicHistory => &[
                "id",
                "guild_id",
                "track_title",
                "track_url",
                "duration_ms",
                "requested_by",
                "recorded_at",
            ],
            Self::CommandQueue => &[
                "id",
                "command_type",
                "payload",
                "status",
                "result",
                "error",
                "created_at",
                "updated_at",
                "completed_at",
            ],
            Self::Playlists => &["id", "user_id", "playlist_name", "created_at", "updated_at"],
            Self::PlaylistTracks => &[
                "id",
                "playlist_id",
                "track_title",
                "track_url",
                "duration_ms",
                "position",
                "added_by",
                "added_by_id",
                "created_at",
            ],
        }
    }

    /// Verifies `column` belongs to this table.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] with code `unknown_column` otherwise.
    pub fn check_column(self, column: &str) -> Result<(), StoreError> {
        if self.columns().contains(&column) {
            Ok(())
        } else {
            Err(StoreError::with_code(
                format!("{} has no column {column:?}", self.name()),
                "unknown_column",
            ))
        }
    }

    /// Whether the console may write this table. The worker owns the rest.
    #[must_use]
    pub const fn console_writable(self) -> bool {
        matches!(self, Self::CommandQueue | Self::Playlists | Self::PlaylistTracks)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw single-row operations against one store implementation.
///
/// Writes are single-row and carry no multi-row atomicity.
#[async_trait]
pub trait StoreBackend: Send + Sync + fmt::Debug {
    /// Reads rows matching `query`.
    async fn read(&self, table: Table, query: &ReadQuery) -> Result<Vec<Row>, StoreError>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError>;

    /// Patches the row with key `key` and returns it as stored.
    async fn update(&self, table: Table, key: &str, patch: Row) -> Result<Row, StoreError>;

    /// Deletes the row with key `key`.
    async fn delete(&self, table: Table, key: &str) -> Result<(), StoreError>;
}

/// The console's handle on the shared store and its change feed.
///
/// Constructed once per process (or per test) and passed to every
/// component that needs it.
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    backend: Arc<dyn StoreBackend>,
    feed: Arc<dyn ChangeFeed>,
}

impl TelemetryStore {
    /// Wraps a backend and the change feed that observes it.
    #[must_use]
    pub fn new(backend: Arc<dyn StoreBackend>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self { backend, feed }
    }

    /// Builds a client over a fresh [`MemoryStore`], returning both.
    #[must_use]
    pub fn in_memory() -> (Self, MemoryStore) {
        let memory = MemoryStore::new();
        let store = Self::new(Arc::new(memory.clone()), Arc::new(memory.feed()));
        (store, memory)
    }

    /// Reads raw rows.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`StoreError`].
    pub async fn read(&self, table: Table, query: &ReadQuery) -> Result<Vec<Row>, StoreError> {
        self.backend.read(table, query).await
    }

    /// Reads and decodes rows.
    ///
    /// A row that fails to decode is skipped and logged, so one malformed
    /// row cannot blank a whole view.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`StoreError`].
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        table: Table,
        query: &ReadQuery,
    ) -> Result<Vec<T>, StoreError> {
        let rows = self.backend.read(table, query).await?;
        Ok(rows.into_iter().filter_map(|row| decode_row(table, row)).collect())
    }

    /// Inserts a serializable value as one row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] with code `read_only` for worker-owned
    /// tables, or the backend's error.
    pub async fn insert<T: Serialize + Sync>(&self, table: Table, value: &T) -> Result<Row, StoreError> {
        ensure_writable(table)?;
        let row = to_row(value)?;
        self.backend.insert(table, row).await
    }

    /// Patches one row by key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] with code `read_only` for worker-owned
    /// tables, `not_found` when no row has the key, or the backend's error.
    pub async fn update(&self, table: Table, key: &str, patch: Row) -> Result<Row, StoreError> {
        ensure_writable(table)?;
        self.backend.update(table, key, patch).await
    }

    /// Deletes one row by key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] with code `read_only` for worker-owned
    /// tables, `not_found` when no row has the key, or the backend's error.
    pub async fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        ensure_writable(table)?;
        self.backend.delete(table, key).await
    }

    /// Subscribes to change notifications for `table`.
    ///
    /// # Errors
    ///
    /// Returns the feed's [`StoreError`] when the subscription cannot be set
    /// up.
    pub async fn subscribe(&self, table: Table, mask: EventMask) -> Result<Subscription, StoreError> {
        self.feed.subscribe(table, mask).await
    }
}

/// Decodes one row, logging and dropping it on failure.
pub(crate) fn decode_row<T: DeserializeOwned>(table: Table, row: Row) -> Option<T> {
    match serde_json::from_value(serde_json::Value::Object(row)) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(table = table.name(), error = %err, "skipping malformed row");
            None
        }
    }
}

/// Serializes a value into a [`Row`].
///
/// # Errors
///
/// Returns a [`StoreError`] with code `encode` when the value is not a JSON
/// object.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(StoreError::with_code(
            format!("expected a JSON object, got {other}"),
            "encode",
        )),
    }
}

fn ensure_writable(table: Table) -> Result<(), StoreError> {
    if table.console_writable() {
        Ok(())
    } else {
        Err(StoreError::with_code(
            format!("{} is written by the worker only", table.name()),
            "read_only",
        ))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::from_name(table.name()), Some(table));
            assert!(table.check_column(table.key_column()).is_ok());
            assert!(table.check_column(table.stamp_column()).is_ok());
        }
    }

    #[tokio::test]
    async fn telemetry_tables_are_read_only_from_the_console() {
        let (store, _memory) = TelemetryStore::in_memory();
        let err = store
            .insert(Table::SystemStats, &json!({"cpu_usage": 1.0}))
            .await
            .err();
        assert_eq!(err.and_then(|e| e.code), Some("read_only".to_string()));
        let err = store.delete(Table::ActiveSessions, "g1").await.err();
        assert_eq!(err.and_then(|e| e.code), Some("read_only".to_string()));
    }

    #[tokio::test]
    async fn fetch_skips_rows_that_do_not_decode() {
        let (store, memory) = TelemetryStore::in_memory();
        let Ok(_) = memory.worker_insert(Table::BotLogs, json!({"level": "info", "message": "ok"})).await else {
            panic!("insert failed");
        };
        let Ok(_) = memory
            .worker_insert(Table::BotLogs, json!({"level": "info", "created_at": "garbage"}))
            .await
        else {
            panic!("insert failed");
        };
        let logs: Vec<crate::domain::BotLogEntry> = store
            .fetch(Table::BotLogs, &ReadQuery::new())
            .await
            .unwrap_or_default();
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn to_row_requires_an_object() {
        assert!(to_row(&json!({"a": 1})).is_ok());
        assert!(to_row(&json!([1, 2])).is_err());
    }
}
