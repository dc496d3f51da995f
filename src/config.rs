//! Console configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::ConsoleError;

/// Default hosting control plane endpoint.
pub const DEFAULT_KOYEB_API_BASE: &str = "https://app.koyeb.com/v1";

/// Which store implementation backs the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    /// Shared PostgreSQL database.
    Postgres,
    /// In-process tables, for local development.
    Memory,
}

impl StoreBackendKind {
    /// Configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for StoreBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Credentials and endpoint of the hosting control plane.
#[derive(Clone, Default)]
pub struct ControlPlaneConfig {
    /// Bearer token.
    pub api_token: Option<String>,
    /// Service to inspect and redeploy.
    pub service_id: Option<String>,
    /// API base URL without trailing slash.
    pub api_base: String,
}

impl std::fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("service_id", &self.service_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Top-level console configuration.
///
/// Loaded once at startup via [`ConsoleConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Store implementation.
    pub store_backend: StoreBackendKind,

    /// PostgreSQL connection string; required for the Postgres backend.
    pub database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// Apply the bundled schema at startup.
    pub run_migrations: bool,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Per-subscription change buffer.
    pub change_feed_buffer: usize,

    /// Length of the live log view.
    pub log_view_limit: usize,

    /// Length of the usage and playback history views.
    pub history_view_limit: usize,

    /// Days covered by the usage-by-day series.
    pub analytics_window_days: u32,

    /// Row cap of analytics reads.
    pub analytics_row_cap: u32,

    /// Length of the top tracks ranking.
    pub top_tracks_limit: usize,

    /// Hosting control plane.
    pub control_plane: ControlPlaneConfig,

    /// Emit logs as JSON.
    pub log_json: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            store_backend: StoreBackendKind::Memory,
            database_url: None,
            database_max_connections: 10,
            database_min_connections: 2,
            database_connect_timeout_secs: 5,
            run_migrations: false,
            event_bus_capacity: 10_000,
            change_feed_buffer: 256,
            log_view_limit: 50,
            history_view_limit: 100,
            analytics_window_days: 7,
            analytics_row_cap: 1_000,
            top_tracks_limit: 5,
            control_plane: ControlPlaneConfig {
                api_token: None,
                service_id: None,
                api_base: DEFAULT_KOYEB_API_BASE.to_string(),
            },
            log_json: false,
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` or `STORE_BACKEND` cannot be
    /// parsed, or if the Postgres backend is selected without
    /// `DATABASE_URL`.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let store_backend: StoreBackendKind = std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = credential("DATABASE_URL");
        if store_backend == StoreBackendKind::Postgres && database_url.is_none() {
            return Err(Box::new(ConsoleError::Configuration(
                "DATABASE_URL must be set for the postgres store backend".to_string(),
            )));
        }

        let control_plane = ControlPlaneConfig {
            api_token: credential("KOYEB_API_TOKEN"),
            service_id: credential("KOYEB_SERVICE_ID"),
            api_base: credential("KOYEB_API_BASE")
                .map_or(defaults.control_plane.api_base, |base| {
                    base.trim_end_matches('/').to_string()
                }),
        };

        Ok(Self {
            listen_addr,
            store_backend,
            database_url,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections),
            database_min_connections: parse_env("DATABASE_MIN_CONNECTIONS", defaults.database_min_connections),
            database_connect_timeout_secs: parse_env(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.database_connect_timeout_secs,
            ),
            run_migrations: parse_env_bool("STORE_RUN_MIGRATIONS", defaults.run_migrations),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            change_feed_buffer: parse_env("CHANGE_FEED_BUFFER", defaults.change_feed_buffer),
            log_view_limit: parse_env("LOG_VIEW_LIMIT", defaults.log_view_limit),
            history_view_limit: parse_env("HISTORY_VIEW_LIMIT", defaults.history_view_limit),
            analytics_window_days: parse_env("ANALYTICS_WINDOW_DAYS", defaults.analytics_window_days),
            analytics_row_cap: parse_env("ANALYTICS_ROW_CAP", defaults.analytics_row_cap),
            top_tracks_limit: parse_env("TOP_TRACKS_LIMIT", defaults.top_tracks_limit),
            control_plane,
            log_json: log_format_is_json(std::env::var("LOG_FORMAT").ok().as_deref()),
        })
    }
}

/// Whether a `LOG_FORMAT` value selects the JSON formatter.
#[must_use]
pub fn log_format_is_json(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

/// Keeps the first whitespace-separated token of a secret; `None` when
/// empty.
///
/// Pasted credentials often carry trailing newlines or comments.
#[must_use]
pub fn sanitize_credential(raw: &str) -> Option<String> {
    raw.split_whitespace().next().map(str::to_string)
}

fn credential(key: &str) -> Option<String> {
    std::env::var(key).ok().as_deref().and_then(sanitize_credential)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    parse_bool(std::env::var(key).ok().as_deref(), default)
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_keep_only_the_first_token() {
        assert_eq!(sanitize_credential("abc123\n"), Some("abc123".to_string()));
        assert_eq!(sanitize_credential("  tok extra words"), Some("tok".to_string()));
        assert_eq!(sanitize_credential("   "), None);
    }

    #[test]
    fn store_backend_parsing() {
        assert_eq!("Postgres".parse::<StoreBackendKind>(), Ok(StoreBackendKind::Postgres));
        assert_eq!("memory".parse::<StoreBackendKind>(), Ok(StoreBackendKind::Memory));
        assert!("sqlite".parse::<StoreBackendKind>().is_err());
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool(Some("TRUE"), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("False"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn log_format_selection() {
        assert!(log_format_is_json(Some("JSON")));
        assert!(!log_format_is_json(Some("pretty")));
        assert!(!log_format_is_json(None));
    }

    #[test]
    fn control_plane_debug_redacts_the_token() {
        let config = ControlPlaneConfig {
            api_token: Some("secret".to_string()),
            service_id: Some("svc".to_string()),
            api_base: DEFAULT_KOYEB_API_BASE.to_string(),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("svc"));
    }
}
