//! Worker-reported telemetry rows.
//!
//! Every type here mirrors one table the worker writes and the console only
//! reads. Optional columns stay `Option` so that a partially filled row still
//! deserializes; consumers treat a missing number as zero.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::reconcile::Versioned;

/// Point-in-time process snapshot from `system_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SystemStatsSample {
    /// Row id, when the store assigns one.
    #[serde(default)]
    pub id: Option<i64>,
    /// CPU usage in percent.
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    /// Resident set size in MiB.
    #[serde(default, alias = "memory_rss")]
    pub ram_rss: Option<f64>,
    /// Heap usage in MiB.
    #[serde(default, alias = "memory_heap")]
    pub ram_heap: Option<f64>,
    /// Gateway latency in milliseconds.
    #[serde(default)]
    pub ping_gateway: Option<f64>,
    /// Audio node latency in milliseconds.
    #[serde(default)]
    pub ping_lavalink: Option<f64>,
    /// Number of guilds the bot is in.
    #[serde(default)]
    pub guild_count: Option<i64>,
    /// Process uptime in seconds.
    #[serde(default)]
    pub uptime: Option<i64>,
    /// Worker-reported status string (`online`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Sample time; monotonically increasing per worker.
    pub recorded_at: DateTime<Utc>,
}

impl Versioned for SystemStatsSample {
    type Version = DateTime<Utc>;

    fn row_key(&self) -> String {
        self.id
            .map_or_else(|| self.recorded_at.to_rfc3339(), |id| id.to_string())
    }

    fn version(&self) -> Self::Version {
        self.recorded_at
    }
}

/// One playing (or paused) guild session from `active_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActiveSession {
    /// Guild the session belongs to; the table key.
    pub guild_id: String,
    /// Current track.
    #[serde(default)]
    pub track_title: Option<String>,
    /// Playback position in milliseconds.
    #[serde(default)]
    pub position_ms: Option<i64>,
    /// Track length in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Whether audio is currently playing.
    #[serde(default)]
    pub is_playing: Option<bool>,
    /// Listeners in the voice channel.
    #[serde(default)]
    pub voice_members_count: Option<i64>,
    /// Last upsert time.
    pub updated_at: DateTime<Utc>,
}

impl ActiveSession {
    /// Playback progress in percent, `0.0..=100.0`.
    ///
    /// A zero or missing duration yields `0.0`.
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        match (self.position_ms, self.duration_ms) {
            (Some(position), Some(duration)) if duration > 0 => {
                let ratio = position.max(0) as f64 / duration as f64;
                (ratio * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }

    /// `true` only when the worker reported playing.
    #[must_use]
    pub fn playing(&self) -> bool {
        self.is_playing.unwrap_or(false)
    }
}

impl Versioned for ActiveSession {
    type Version = DateTime<Utc>;

    fn row_key(&self) -> String {
        self.guild_id.clone()
    }

    fn version(&self) -> Self::Version {
        self.updated_at
    }
}

/// Renders milliseconds as `m:ss`.
#[must_use]
pub fn format_clock(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Severity of a worker log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum LogLevel {
    /// Diagnostic noise.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something degraded.
    Warning,
    /// An operation failed.
    Error,
    /// The worker is unhealthy.
    Critical,
}

impl LogLevel {
    /// Parses a free-form level; unknown values fall back to [`LogLevel::Info`].
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warn" | "warning" => Self::Warning,
            "error" => Self::Error,
            "critical" | "fatal" => Self::Critical,
            _ => Self::Info,
        }
    }

    /// `true` for `error` and `critical`.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl From<Option<String>> for LogLevel {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map_or(Self::Info, Self::parse_lenient)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One worker log line from `bot_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BotLogEntry {
    /// Row id.
    pub id: i64,
    /// Severity.
    #[serde(default)]
    pub level: LogLevel,
    /// Log text.
    #[serde(default)]
    pub message: Option<String>,
    /// Subsystem that logged the line.
    #[serde(default)]
    pub scope: Option<String>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

impl Versioned for BotLogEntry {
    type Version = (DateTime<Utc>, i64);

    fn row_key(&self) -> String {
        self.id.to_string()
    }

    fn version(&self) -> Self::Version {
        (self.created_at, self.id)
    }
}

/// One chat-model call from `gemini_usage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageRecord {
    /// Row id.
    pub id: i64,
    /// Guild the request came from.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// User who asked.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: Option<i64>,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: Option<i64>,
    /// Total tokens.
    #[serde(default)]
    pub total_tokens: Option<i64>,
    /// Model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Call time.
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Prompt tokens, zero when missing.
    #[must_use]
    pub fn prompt(&self) -> i64 {
        self.prompt_tokens.unwrap_or(0)
    }

    /// Completion tokens, zero when missing.
    #[must_use]
    pub fn completion(&self) -> i64 {
        self.completion_tokens.unwrap_or(0)
    }

    /// Total tokens, zero when missing.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.total_tokens.unwrap_or(0)
    }
}

impl Versioned for UsageRecord {
    type Version = (DateTime<Utc>, i64);

    fn row_key(&self) -> String {
        self.id.to_string()
    }

    fn version(&self) -> Self::Version {
        (self.recorded_at, self.id)
    }
}

/// One played track from `music_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlaybackRecord {
    /// Row id.
    pub id: i64,
    /// Guild it played in.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Track title.
    #[serde(default)]
    pub track_title: Option<String>,
    /// Track URL.
    #[serde(default)]
    pub track_url: Option<String>,
    /// Track length in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Who queued it.
    #[serde(default)]
    pub requested_by: Option<String>,
    /// Play time.
    pub recorded_at: DateTime<Utc>,
}

impl Versioned for PlaybackRecord {
    type Version = (DateTime<Utc>, i64);

    fn row_key(&self) -> String {
        self.id.to_string()
    }

    fn version(&self) -> Self::Version {
        (self.recorded_at, self.id)
    }
}
