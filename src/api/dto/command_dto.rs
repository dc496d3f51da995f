//! Command dispatch DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{CommandId, CommandQueueEntry};

/// Request body for `POST /commands`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DispatchRequest {
    /// Command name (`pause`, `resume`, `skip`, `stop`, or any worker command).
    pub command_type: String,
    /// JSON object carrying at least `guild_id`.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

/// Optional wait on dispatch endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct WaitParams {
    /// Seconds to wait for a terminal status (0-30). Without it the
    /// endpoint returns as soon as the entry is queued.
    #[serde(default)]
    pub wait_secs: Option<u64>,
}

impl WaitParams {
    /// Returns the wait clamped to 30 seconds; `None` for no wait.
    #[must_use]
    pub fn clamped(&self) -> Option<u64> {
        self.wait_secs.filter(|s| *s > 0).map(|s| s.min(30))
    }
}

/// Response body for accepted commands (202).
#[derive(Debug, Serialize, ToSchema)]
pub struct DispatchResponse {
    /// Id of the queued entry.
    pub command_id: CommandId,
    /// Entry as reconciled when the response was built.
    pub entry: CommandQueueEntry,
}
