//! Observed resources and their staleness SLAs.
//!
//! The poll interval of each resource is declared here once. It is the
//! upper bound on how stale the console's cached view may get when push
//! delivery is silently lost.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A view the console keeps current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Latest worker process sample.
    SystemStats,
    /// Guild playback sessions.
    ActiveSessions,
    /// Recent worker log lines.
    BotLogs,
    /// Recent chat-model calls.
    UsageLog,
    /// Recent played tracks.
    PlaybackLog,
    /// Commands dispatched by this console.
    CommandQueue,
    /// Hosting platform service status.
    InfraStatus,
    /// Derived usage and playback rollups.
    Analytics,
    /// Playlists with tracks.
    Playlists,
}

impl Resource {
    /// Every resource, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::SystemStats,
        Self::ActiveSessions,
        Self::BotLogs,
        Self::UsageLog,
        Self::PlaybackLog,
        Self::CommandQueue,
        Self::InfraStatus,
        Self::Analytics,
        Self::Playlists,
    ];

    /// Fixed re-fetch interval, independent of push health.
    #[must_use]
    pub const fn poll_interval(self) -> Duration {
        match self {
            Self::SystemStats | Self::ActiveSessions | Self::CommandQueue => Duration::from_secs(5),
            Self::BotLogs | Self::UsageLog | Self::PlaybackLog | Self::InfraStatus => {
                Duration::from_secs(10)
            }
            Self::Analytics | Self::Playlists => Duration::from_secs(30),
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SystemStats => "system_stats",
            Self::ActiveSessions => "active_sessions",
            Self::BotLogs => "bot_logs",
            Self::UsageLog => "usage_log",
            Self::PlaybackLog => "playback_log",
            Self::CommandQueue => "command_queue",
            Self::InfraStatus => "infra_status",
            Self::Analytics => "analytics",
            Self::Playlists => "playlists",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown resource: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slas_match_declared_tiers() {
        assert_eq!(Resource::SystemStats.poll_interval(), Duration::from_secs(5));
        assert_eq!(Resource::BotLogs.poll_interval(), Duration::from_secs(10));
        assert_eq!(Resource::Playlists.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn names_round_trip() {
        for resource in Resource::ALL {
            assert_eq!(resource.as_str().parse::<Resource>(), Ok(resource));
        }
        assert!("nope".parse::<Resource>().is_err());
    }
}
