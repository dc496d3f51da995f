//! Command dispatch through the shared queue.
//!
//! The queue is an asynchronous, at-least-once RPC channel: the console
//! appends a `pending` entry and returns; the worker picks it up, executes
//! it, and writes the outcome back onto the same row. Outcomes reach the
//! console through the command reconciler like any other telemetry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use crate::domain::{CommandId, CommandQueueEntry, CommandType};
use crate::error::ConsoleError;
use crate::reconcile::{LatestReconciler, Versioned};
use crate::store::{Table, TelemetryStore, decode_row};

/// Appends commands and hands out handles that observe their outcome.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    store: TelemetryStore,
    commands: Arc<LatestReconciler<CommandQueueEntry>>,
}

impl CommandDispatcher {
    /// Creates a dispatcher writing through `store` and observing through
    /// `commands`.
    #[must_use]
    pub fn new(store: TelemetryStore, commands: Arc<LatestReconciler<CommandQueueEntry>>) -> Self {
        Self { store, commands }
    }

    /// Enqueues one new command and returns without waiting for the worker.
    ///
    /// Every call creates exactly one entry, even when an identical command
    /// is already pending for the same guild.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::InvalidCommand`] when `command_type` is empty or
    /// `payload` lacks a `guild_id`; [`ConsoleError::CommandNotSent`] when
    /// the store write fails, in which case no entry exists.
    pub async fn dispatch(
        &self,
        command_type: CommandType,
        payload: Value,
    ) -> Result<CommandHandle, ConsoleError> {
        validate(&command_type, &payload)?;

        let entry = CommandQueueEntry::pending(command_type, payload, Utc::now());
        let stored = match self.store.insert(Table::CommandQueue, &entry).await {
            Ok(row) => decode_row::<CommandQueueEntry>(Table::CommandQueue, row).unwrap_or(entry),
            Err(err) => {
                tracing::warn!(
                    command = %entry.command_type,
                    error = %err,
                    "command not sent"
                );
                return Err(ConsoleError::CommandNotSent(err));
            }
        };

        let id = stored.id;
        let key = stored.row_key();
        self.commands.apply(&key, stored.clone()).await;
        tracing::info!(
            command_id = %id,
            command = %stored.command_type,
            guild = stored.target_guild().unwrap_or_default(),
            "command enqueued"
        );

        Ok(CommandHandle {
            id,
            entry: stored,
            rx: self.commands.watch(&key).await,
        })
    }
}

fn validate(command_type: &CommandType, payload: &Value) -> Result<(), ConsoleError> {
    if command_type.as_str().trim().is_empty() {
        return Err(ConsoleError::InvalidCommand("command_type is empty".to_string()));
    }
    let Some(object) = payload.as_object() else {
        return Err(ConsoleError::InvalidCommand("payload must be a JSON object".to_string()));
    };
    let has_guild = match object.get("guild_id") {
        Some(Value::String(id)) => !id.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    };
    if !has_guild {
        return Err(ConsoleError::InvalidCommand("payload.guild_id is required".to_string()));
    }
    Ok(())
}

/// A dispatched command.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    id: CommandId,
    entry: CommandQueueEntry,
    rx: watch::Receiver<Option<CommandQueueEntry>>,
}

impl CommandHandle {
    /// Command id.
    #[must_use]
    pub const fn id(&self) -> CommandId {
        self.id
    }

    /// The entry as enqueued.
    #[must_use]
    pub const fn entry(&self) -> &CommandQueueEntry {
        &self.entry
    }

    /// Receiver over the reconciled entry.
    #[must_use]
    pub fn observe(&self) -> watch::Receiver<Option<CommandQueueEntry>> {
        self.rx.clone()
    }

    /// Waits until the worker marks the command `completed` or `failed`.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::Timeout`] when no outcome arrives within `timeout`;
    /// the command may still finish later.
    pub async fn wait_for_outcome(&self, timeout: Duration) -> Result<CommandQueueEntry, ConsoleError> {
        let mut rx = self.rx.clone();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|entry| entry.as_ref().is_some_and(|e| e.status.is_terminal())),
        )
        .await;
        match waited {
            Ok(Ok(entry)) => entry
                .clone()
                .ok_or_else(|| ConsoleError::Internal("command entry vanished".to_string())),
            Ok(Err(_)) => Err(ConsoleError::Internal("command view closed".to_string())),
            Err(_) => Err(ConsoleError::Timeout(format!("no outcome for command {}", self.id))),
        }
    }
}
