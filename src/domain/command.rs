//! Command queue entries: the only mutable entity the console creates.
//!
//! Lifecycle: `pending` → `in_progress` (optional) → `completed` | `failed`.
//! The console inserts `pending` rows; every later transition is written by
//! the worker.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use super::CommandId;
use crate::reconcile::Versioned;

/// What the worker is asked to do.
///
/// The session controls are named; anything else is carried verbatim so the
/// queue stays open to commands the worker learns later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandType {
    /// Pause playback in a guild.
    Pause,
    /// Resume playback in a guild.
    Resume,
    /// Skip the current track.
    Skip,
    /// Stop playback and leave the voice channel.
    Stop,
    /// Any other command string.
    Other(String),
}

impl CommandType {
    /// Returns the wire name stored in `command_queue.command_type`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Skip => "skip",
            Self::Stop => "stop",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for the playback controls bound to one guild session.
    #[must_use]
    pub const fn is_session_control(&self) -> bool {
        matches!(self, Self::Pause | Self::Resume | Self::Skip | Self::Stop)
    }
}

impl From<String> for CommandType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            _ => Self::Other(raw),
        }
    }
}

impl From<&str> for CommandType {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<CommandType> for String {
    fn from(kind: CommandType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Enqueued by the console, not yet picked up.
    Pending,
    /// Picked up by the worker.
    InProgress,
    /// Executed successfully.
    Completed,
    /// Execution failed; see `error`.
    Failed,
}

impl CommandStatus {
    /// Position in the lifecycle. Terminal states share the highest rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns `true` for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `command_queue` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommandQueueEntry {
    /// Unique id.
    pub id: CommandId,
    /// Command name. Older workers write the column as `command`.
    #[serde(alias = "command")]
    #[schema(value_type = String)]
    pub command_type: CommandType,
    /// Structured payload, opaque to the queue. Always carries `guild_id`
    /// for entries created by the console.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// Lifecycle status.
    pub status: CommandStatus,
    /// Worker-reported result.
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: Option<String>,
    /// Worker-reported failure reason.
    #[serde(default, deserialize_with = "lenient_text")]
    pub error: Option<String>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Time the entry reached a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CommandQueueEntry {
    /// Builds the `pending` row the dispatcher inserts.
    #[must_use]
    pub fn pending(command_type: CommandType, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: CommandId::new(),
            command_type,
            payload,
            status: CommandStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: Some(now),
            completed_at: None,
        }
    }

    /// Guild this command targets, if the payload names one.
    #[must_use]
    pub fn target_guild(&self) -> Option<&str> {
        self.payload.get("guild_id").and_then(serde_json::Value::as_str)
    }

    /// Latest timestamp the row carries.
    #[must_use]
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.updated_at
            .into_iter()
            .chain(self.completed_at)
            .fold(self.created_at, std::cmp::max)
    }
}

impl Versioned for CommandQueueEntry {
    type Version = (u8, DateTime<Utc>);

    fn row_key(&self) -> String {
        self.id.to_string()
    }

    fn version(&self) -> Self::Version {
        (self.status.rank(), self.last_touched())
    }
}

/// Accepts a string, `null`, or any other JSON value (stringified).
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_type_round_trips_known_and_custom_names() {
        assert_eq!(CommandType::from("SKIP"), CommandType::Skip);
        assert_eq!(
            CommandType::from("volume"),
            CommandType::Other("volume".to_string())
        );
        assert_eq!(String::from(CommandType::Resume), "resume");
        assert!(CommandType::Pause.is_session_control());
        assert!(!CommandType::from("volume").is_session_control());
    }

    #[test]
    fn status_rank_is_monotonic_over_lifecycle() {
        assert!(CommandStatus::Pending.rank() < CommandStatus::InProgress.rank());
        assert!(CommandStatus::InProgress.rank() < CommandStatus::Completed.rank());
        assert_eq!(CommandStatus::Completed.rank(), CommandStatus::Failed.rank());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(!CommandStatus::InProgress.is_terminal());
    }

    #[test]
    fn deserializes_worker_row_with_legacy_column() {
        let row = json!({
            "id": "6f1c2f44-3b0e-4f5e-9a55-0d6c4a1b2c3d",
            "command": "skip",
            "payload": {"guild_id": "42"},
            "status": "failed",
            "error": "not connected",
            "result": {"skipped": false},
            "created_at": "2026-01-12T03:00:00+00:00",
            "completed_at": "2026-01-12T03:00:02+00:00"
        });
        let Ok(entry) = serde_json::from_value::<CommandQueueEntry>(row) else {
            panic!("row should deserialize");
        };
        assert_eq!(entry.command_type, CommandType::Skip);
        assert_eq!(entry.status, CommandStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("not connected"));
        assert_eq!(entry.result.as_deref(), Some("{\"skipped\":false}"));
        assert_eq!(entry.target_guild(), Some("42"));
        assert_eq!(entry.last_touched(), entry.completed_at.unwrap_or_default());
    }

    #[test]
    fn terminal_status_outranks_later_pending_timestamp() {
        let now = Utc::now();
        let mut done = CommandQueueEntry::pending(CommandType::Skip, json!({"guild_id": "1"}), now);
        done.status = CommandStatus::Completed;
        let mut stale = done.clone();
        stale.status = CommandStatus::Pending;
        stale.updated_at = Some(now + chrono::Duration::seconds(5));
        assert!(done.version() > stale.version());
    }
}
