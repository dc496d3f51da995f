//! Connectivity diagnostics: checks every table and reports which settings
//! are present, without revealing their values.

use futures_util::future::join_all;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConsoleConfig;
use crate::store::{ReadQuery, Table, TelemetryStore};

/// Outcome of reading one row from a table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableCheck {
    /// Table name.
    pub table: String,
    /// Whether the read succeeded.
    pub ok: bool,
    /// Rows returned (0 or 1).
    pub sample_rows: usize,
    /// Store error message, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Store error code, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Which settings are configured.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SettingsPresence {
    /// Active store backend.
    pub store_backend: String,
    /// `DATABASE_URL` is set.
    pub database_url: bool,
    /// `KOYEB_API_TOKEN` is set.
    pub control_plane_token: bool,
    /// `KOYEB_SERVICE_ID` is set.
    pub control_plane_service: bool,
}

impl SettingsPresence {
    /// Records presence only; no value leaves the config.
    #[must_use]
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self {
            store_backend: config.store_backend.as_str().to_string(),
            database_url: config.database_url.is_some(),
            control_plane_token: config.control_plane.api_token.is_some(),
            control_plane_service: config.control_plane.service_id.is_some(),
        }
    }
}

/// Full diagnostics report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Diagnostics {
    /// `true` when every table check succeeded.
    pub healthy: bool,
    /// One check per table.
    pub tables: Vec<TableCheck>,
    /// Configuration presence.
    pub settings: SettingsPresence,
}

/// Runs the table checks.
#[derive(Debug, Clone)]
pub struct DiagnosticsService {
    store: TelemetryStore,
    settings: SettingsPresence,
}

impl DiagnosticsService {
    /// Creates a service probing `store`.
    #[must_use]
    pub fn new(store: TelemetryStore, config: &ConsoleConfig) -> Self {
        Self {
            store,
            settings: SettingsPresence::from_config(config),
        }
    }

    /// Reads one row from every table, concurrently.
    pub async fn run(&self) -> Diagnostics {
        let tables = join_all(Table::ALL.into_iter().map(|table| self.check(table))).await;
        let healthy = tables.iter().all(|check| check.ok);
        if !healthy {
            tracing::warn!(
                failed = tables.iter().filter(|p| !p.ok).count(),
                "store diagnostics found unreachable tables"
            );
        }
        Diagnostics {
            healthy,
            tables,
            settings: self.settings.clone(),
        }
    }

    async fn check(&self, table: Table) -> TableCheck {
        match self.store.read(table, &ReadQuery::new().limit(1)).await {
            Ok(rows) => TableCheck {
                table: table.name().to_string(),
                ok: true,
                sample_rows: rows.len(),
                error: None,
                code: None,
            },
            Err(err) => TableCheck {
                table: table.name().to_string(),
                ok: false,
                sample_rows: 0,
                error: Some(err.message),
                code: err.code,
            },
        }
    }
}
