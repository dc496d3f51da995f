//! Shared DTO types used across multiple endpoints.

use serde::Deserialize;
use utoipa::IntoParams;

/// Maximum rows a list endpoint returns.
pub const MAX_LIMIT: usize = 500;

/// `?limit=` query parameter for list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct LimitParams {
    /// Rows to return (1-500). Defaults to the endpoint's own default.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LimitParams {
    /// Returns the requested limit clamped to `1..=MAX_LIMIT`, or `default`.
    #[must_use]
    pub fn clamped(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

/// `?days=` query parameter for per-day rollups.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct DaysParams {
    /// Window length in days (1-90). Defaults to 7.
    #[serde(default = "default_days")]
    pub days: u32,
}

impl DaysParams {
    /// Returns `days` clamped to `1..=90`.
    #[must_use]
    pub fn clamped(&self) -> u32 {
        self.days.clamp(1, 90)
    }
}

fn default_days() -> u32 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(LimitParams { limit: None }.clamped(50), 50);
        assert_eq!(LimitParams { limit: Some(0) }.clamped(50), 1);
        assert_eq!(LimitParams { limit: Some(10_000) }.clamped(50), MAX_LIMIT);
    }

    #[test]
    fn days_clamp_to_window() {
        assert_eq!(DaysParams { days: 0 }.clamped(), 1);
        assert_eq!(DaysParams { days: 400 }.clamped(), 90);
    }
}
