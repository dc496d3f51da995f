//! Session view enriched with display-ready progress.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ActiveSession;
use crate::domain::telemetry::format_clock;

/// An active session with derived progress fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    /// Reconciled session row.
    #[serde(flatten)]
    pub session: ActiveSession,
    /// Playback progress, `0.0..=100.0`.
    pub progress_percent: f64,
    /// Position as `m:ss`.
    pub position: String,
    /// Duration as `m:ss`.
    pub duration: String,
}

impl From<ActiveSession> for SessionView {
    fn from(session: ActiveSession) -> Self {
        Self {
            progress_percent: session.progress_percent(),
            position: format_clock(session.position_ms.unwrap_or(0)),
            duration: format_clock(session.duration_ms.unwrap_or(0)),
            session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn view_formats_progress() {
        let view = SessionView::from(ActiveSession {
            guild_id: "g".to_string(),
            track_title: None,
            position_ms: Some(90_000),
            duration_ms: Some(180_000),
            is_playing: Some(true),
            voice_members_count: None,
            updated_at: Utc::now(),
        });
        assert!((view.progress_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(view.position, "1:30");
        assert_eq!(view.duration, "3:00");
    }
}
