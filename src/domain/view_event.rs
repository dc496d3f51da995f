//! Events emitted when a reconciled view visibly changes.
//!
//! A [`ViewUpdate`] is published through the [`super::EventBus`] only after
//! the reconciler accepted a change, so subscribers never see a regression
//! or a duplicate.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Resource;

/// Where an accepted change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// A change-feed notification.
    Push,
    /// A scheduled or on-demand re-fetch.
    Poll,
    /// A write made by this console.
    Local,
}

/// New state of one resource (or one keyed entry of it).
#[derive(Debug, Clone, Serialize)]
pub struct ViewUpdate {
    /// Resource that changed.
    pub resource: Resource,
    /// Entry key for keyed resources (command id), `None` for whole views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Channel that delivered the change.
    pub source: UpdateSource,
    /// Current view after the change.
    pub view: serde_json::Value,
    /// Time the change was accepted.
    pub timestamp: DateTime<Utc>,
}

impl ViewUpdate {
    /// Builds an update for a whole-resource view.
    #[must_use]
    pub fn whole(resource: Resource, source: UpdateSource, view: serde_json::Value) -> Self {
        Self {
            resource,
            key: None,
            source,
            view,
            timestamp: Utc::now(),
        }
    }

    /// Builds an update for a single keyed entry.
    #[must_use]
    pub fn keyed(
        resource: Resource,
        key: impl Into<String>,
        source: UpdateSource,
        view: serde_json::Value,
    ) -> Self {
        Self {
            resource,
            key: Some(key.into()),
            source,
            view,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_update_serializes_key_and_source() {
        let update = ViewUpdate::keyed(
            Resource::CommandQueue,
            "abc",
            UpdateSource::Push,
            serde_json::json!({"status": "completed"}),
        );
        let json = serde_json::to_string(&update).unwrap_or_default();
        assert!(json.contains("\"command_queue\""));
        assert!(json.contains("\"key\":\"abc\""));
        assert!(json.contains("\"push\""));
    }

    #[test]
    fn whole_update_omits_key() {
        let update = ViewUpdate::whole(Resource::BotLogs, UpdateSource::Poll, serde_json::json!([]));
        let json = serde_json::to_string(&update).unwrap_or_default();
        assert!(!json.contains("\"key\""));
    }
}
