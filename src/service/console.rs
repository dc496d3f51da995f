//! The console service: owns every reconciled view and keeps it fresh.
//!
//! Each observed [`Resource`] gets a poll job (the staleness bound) and,
//! when it is backed by a table, a push pump on the change feed. Both feed
//! the same reconcilers; only visible changes are published on the
//! [`EventBus`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::aggregator::{DayBucket, Ranked};
use super::analytics::{AnalyticsService, AnalyticsSummary};
use super::diagnostics::{Diagnostics, DiagnosticsService};
use super::dispatcher::{CommandDispatcher, CommandHandle};
use super::observation::{Observation, spawn_pump};
use super::playlists::{PlaylistService, TrackDraft};
use crate::config::ConsoleConfig;
use crate::control_plane::{KoyebClient, RedeployOutcome, ServiceStatus};
use crate::domain::{
    ActiveSession, BotLogEntry, CommandId, CommandQueueEntry, CommandType, EventBus, PlaybackRecord,
    Playlist, PlaylistTrack, PlaylistWithTracks, Resource, SystemStatsSample, UpdateSource,
    UsageRecord, ViewUpdate,
};
use crate::error::ConsoleError;
use crate::feed::{ChangeEvent, ChangeKind, EventMask};
use crate::poll::PollScheduler;
use crate::reconcile::{Applied, CollectionReconciler, LatestReconciler, SnapshotView, Versioned};
use crate::store::{ReadQuery, Row, Table, TelemetryStore, decode_row};

/// Key of the single stats slot.
pub const STATS_KEY: &str = "system_stats";

/// Most recent commands re-read on every poll.
const COMMAND_BACKFILL: u32 = 50;

/// Settled commands kept in the view; in-flight and watched ones are kept
/// regardless.
const COMMAND_VIEW_LIMIT: usize = 50;

/// Table and change kinds pushed for a resource, if it is table-backed.
#[must_use]
pub const fn push_source(resource: Resource) -> Option<(Table, EventMask)> {
    match resource {
        Resource::SystemStats => Some((Table::SystemStats, EventMask::INSERT)),
        Resource::ActiveSessions => Some((Table::ActiveSessions, EventMask::ALL)),
        Resource::BotLogs => Some((Table::BotLogs, EventMask::INSERT)),
        Resource::UsageLog => Some((Table::GeminiUsage, EventMask::INSERT)),
        Resource::PlaybackLog => Some((Table::MusicHistory, EventMask::INSERT)),
        Resource::CommandQueue => Some((Table::CommandQueue, EventMask::INSERT_UPDATE)),
        Resource::InfraStatus | Resource::Analytics | Resource::Playlists => None,
    }
}

/// Every reconciled view the console serves.
#[derive(Debug)]
pub struct ConsoleViews {
    /// Latest stats sample under [`STATS_KEY`].
    pub stats: LatestReconciler<SystemStatsSample>,
    /// Active sessions keyed by guild.
    pub sessions: CollectionReconciler<ActiveSession>,
    /// Live log tail.
    pub logs: CollectionReconciler<BotLogEntry>,
    /// Recent chat-model usage.
    pub usage: CollectionReconciler<UsageRecord>,
    /// Recent playback history.
    pub playback: CollectionReconciler<PlaybackRecord>,
    /// Command entries keyed by id.
    pub commands: Arc<LatestReconciler<CommandQueueEntry>>,
    /// Analytics summary.
    pub analytics: SnapshotView<AnalyticsSummary>,
    /// All playlists with tracks.
    pub playlists: SnapshotView<Vec<PlaylistWithTracks>>,
    /// Hosting status of the worker.
    pub infra: SnapshotView<ServiceStatus>,
}

impl ConsoleViews {
    fn new(config: &ConsoleConfig) -> Self {
        Self {
            stats: LatestReconciler::new(),
            sessions: CollectionReconciler::new(None),
            logs: CollectionReconciler::new(Some(config.log_view_limit)),
            usage: CollectionReconciler::new(Some(config.history_view_limit)),
            playback: CollectionReconciler::new(Some(config.history_view_limit)),
            commands: Arc::new(LatestReconciler::new()),
            analytics: SnapshotView::new(),
            playlists: SnapshotView::new(),
            infra: SnapshotView::new(),
        }
    }
}

/// Fetch-and-apply logic shared by poll jobs, push pumps and handlers.
#[derive(Debug, Clone)]
struct ViewSync {
    store: TelemetryStore,
    views: Arc<ConsoleViews>,
    bus: EventBus,
    log_limit: u32,
    history_limit: u32,
    analytics: AnalyticsService,
    playlists: PlaylistService,
    control_plane: KoyebClient,
}

impl ViewSync {
    async fn poll(&self, resource: Resource) -> Result<(), ConsoleError> {
        let started = Instant::now();
        let source = UpdateSource::Poll;
        match resource {
            Resource::SystemStats => {
                let latest: Vec<SystemStatsSample> = self
                    .store
                    .fetch(
                        Table::SystemStats,
                        &ReadQuery::new().newest_first("recorded_at").limit(1),
                    )
                    .await?;
                for sample in latest {
                    self.apply_stats(sample, source).await;
                }
            }
            Resource::ActiveSessions => {
                let rows = self.store.fetch(Table::ActiveSessions, &ReadQuery::new()).await?;
                let applied = self.views.sessions.apply_snapshot(rows, started).await;
                self.publish_applied(resource, source, &applied);
            }
            Resource::BotLogs => {
                let rows = self
                    .store
                    .fetch(
                        Table::BotLogs,
                        &ReadQuery::new().newest_first("created_at").limit(self.log_limit),
                    )
                    .await?;
                let applied = self.views.logs.merge(rows).await;
                self.publish_applied(resource, source, &applied);
            }
            Resource::UsageLog => {
                let rows = self
                    .store
                    .fetch(
                        Table::GeminiUsage,
                        &ReadQuery::new().newest_first("recorded_at").limit(self.history_limit),
                    )
                    .await?;
                let applied = self.views.usage.merge(rows).await;
                self.publish_applied(resource, source, &applied);
            }
            Resource::PlaybackLog => {
                let rows = self
                    .store
                    .fetch(
                        Table::MusicHistory,
                        &ReadQuery::new().newest_first("recorded_at").limit(self.history_limit),
                    )
                    .await?;
                let applied = self.views.playback.merge(rows).await;
                self.publish_applied(resource, source, &applied);
            }
            Resource::CommandQueue => self.poll_commands().await?,
            Resource::InfraStatus => {
                let status = self.control_plane.status().await?;
                if self.views.infra.offer(status.clone(), started).await {
                    self.publish(resource, None, source, &status);
                }
            }
            Resource::Analytics => {
                let summary = self.analytics.summary(Utc::now()).await?;
                if self.views.analytics.offer(summary.clone(), started).await {
                    self.publish(resource, None, source, &summary);
                }
            }
            Resource::Playlists => self.refresh_playlists(started, source).await?,
        }
        Ok(())
    }

    /// Re-reads the most recent commands and every tracked command still in
    /// flight, then trims settled entries beyond [`COMMAND_VIEW_LIMIT`].
    async fn poll_commands(&self) -> Result<(), ConsoleError> {
        let recent: Vec<CommandQueueEntry> = self
            .store
            .fetch(
                Table::CommandQueue,
                &ReadQuery::new().newest_first("created_at").limit(COMMAND_BACKFILL),
            )
            .await?;
        let seen: HashSet<String> = recent.iter().map(Versioned::row_key).collect();
        let in_flight: Vec<String> = self
            .views
            .commands
            .values()
            .await
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(Versioned::row_key)
            .filter(|key| !seen.contains(key))
            .collect();

        for entry in recent {
            self.apply_command(entry, UpdateSource::Poll).await;
        }
        for ids in in_flight.chunks(COMMAND_VIEW_LIMIT) {
            let query = ReadQuery::new()
                .any_of("id", ids.iter().cloned())
                .limit(limit_u32(ids.len()));
            let rows: Vec<CommandQueueEntry> = self.store.fetch(Table::CommandQueue, &query).await?;
            for entry in rows {
                self.apply_command(entry, UpdateSource::Poll).await;
            }
        }

        let evicted = self
            .views
            .commands
            .retain_recent(COMMAND_VIEW_LIMIT, |entry| !entry.status.is_terminal(), |entry| {
                entry.created_at
            })
            .await;
        if evicted > 0 {
            tracing::debug!(evicted, "settled commands dropped from the view");
        }
        Ok(())
    }

    async fn refresh_playlists(&self, started: Instant, source: UpdateSource) -> Result<(), ConsoleError> {
        let listed = self.playlists.list(None).await?;
        if self.views.playlists.offer(listed.clone(), started).await {
            self.publish(Resource::Playlists, None, source, &listed);
        }
        Ok(())
    }

    async fn apply_stats(&self, sample: SystemStatsSample, source: UpdateSource) {
        let applied = self.views.stats.apply(STATS_KEY, sample).await;
        if applied.changed {
            self.publish(Resource::SystemStats, None, source, &applied.current);
        }
    }

    async fn apply_command(&self, entry: CommandQueueEntry, source: UpdateSource) {
        let key = entry.row_key();
        let applied = self.views.commands.apply(&key, entry).await;
        if applied.changed
            && let Some(current) = &applied.current
        {
            tracing::debug!(command_id = %current.id, status = %current.status, "command view advanced");
            self.publish(Resource::CommandQueue, Some(key), source, current);
        }
    }

    async fn apply_change(&self, event: ChangeEvent) {
        let source = UpdateSource::Push;
        let table = event.table;
        match (table, event.kind) {
            (Table::ActiveSessions, ChangeKind::Delete) => {
                let Some(old) = event.old_row else {
                    return;
                };
                let Some(key) = old.get("guild_id").and_then(text) else {
                    return;
                };
                let version = decode_row::<ActiveSession>(table, old).map(|s| s.version());
                let applied = self.views.sessions.remove(&key, version).await;
                self.publish_applied(Resource::ActiveSessions, source, &applied);
            }
            (_, ChangeKind::Delete) => {}
            (Table::SystemStats, _) => {
                if let Some(sample) = decoded(table, event.new_row) {
                    self.apply_stats(sample, source).await;
                }
            }
            (Table::ActiveSessions, _) => {
                if let Some(session) = decoded(table, event.new_row) {
                    let applied = self.views.sessions.upsert(session).await;
                    self.publish_applied(Resource::ActiveSessions, source, &applied);
                }
            }
            (Table::BotLogs, _) => {
                if let Some(entry) = decoded(table, event.new_row) {
                    let applied = self.views.logs.upsert(entry).await;
                    self.publish_applied(Resource::BotLogs, source, &applied);
                }
            }
            (Table::GeminiUsage, _) => {
                if let Some(record) = decoded(table, event.new_row) {
                    let applied = self.views.usage.upsert(record).await;
                    self.publish_applied(Resource::UsageLog, source, &applied);
                }
            }
            (Table::MusicHistory, _) => {
                if let Some(record) = decoded(table, event.new_row) {
                    let applied = self.views.playback.upsert(record).await;
                    self.publish_applied(Resource::PlaybackLog, source, &applied);
                }
            }
            (Table::CommandQueue, _) => {
                if let Some(entry) = decoded(table, event.new_row) {
                    self.apply_command(entry, source).await;
                }
            }
            (Table::Playlists | Table::PlaylistTracks, _) => {}
        }
    }

    fn publish_applied<T: Serialize>(&self, resource: Resource, source: UpdateSource, applied: &Applied<Vec<T>>) {
        if applied.changed {
            self.publish(resource, None, source, &applied.current);
        }
    }

    fn publish<V: Serialize + ?Sized>(&self, resource: Resource, key: Option<String>, source: UpdateSource, view: &V) {
        let view = match serde_json::to_value(view) {
            Ok(view) => view,
            Err(err) => {
                tracing::warn!(%resource, error = %err, "view did not serialize");
                return;
            }
        };
        let update = match key {
            Some(key) => ViewUpdate::keyed(resource, key, source, view),
            None => ViewUpdate::whole(resource, source, view),
        };
        let receivers = self.bus.publish(update);
        tracing::trace!(%resource, receivers, "view update published");
    }
}

fn decoded<T: serde::de::DeserializeOwned>(table: Table, row: Option<Row>) -> Option<T> {
    row.and_then(|row| decode_row(table, row))
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Operator console over the shared store.
#[derive(Debug)]
pub struct ConsoleService {
    sync: ViewSync,
    scheduler: Arc<PollScheduler>,
    observations: Mutex<HashMap<Resource, Observation>>,
    dispatcher: CommandDispatcher,
    diagnostics: DiagnosticsService,
}

impl ConsoleService {
    /// Builds the console around an explicitly constructed store client.
    #[must_use]
    pub fn new(store: TelemetryStore, config: &ConsoleConfig, event_bus: EventBus) -> Self {
        let views = Arc::new(ConsoleViews::new(config));
        let dispatcher = CommandDispatcher::new(store.clone(), Arc::clone(&views.commands));
        let diagnostics = DiagnosticsService::new(store.clone(), config);
        let sync = ViewSync {
            analytics: AnalyticsService::new(
                store.clone(),
                config.analytics_window_days,
                config.analytics_row_cap,
                config.top_tracks_limit,
            ),
            playlists: PlaylistService::new(store.clone()),
            control_plane: KoyebClient::new(config.control_plane.clone()),
            store,
            views,
            bus: event_bus,
            log_limit: limit_u32(config.log_view_limit),
            history_limit: limit_u32(config.history_view_limit),
        };
        Self {
            sync,
            scheduler: Arc::new(PollScheduler::new()),
            observations: Mutex::new(HashMap::new()),
            dispatcher,
            diagnostics,
        }
    }

    /// Starts observing every resource. Infra status is skipped when the
    /// control plane has no credentials.
    pub async fn start(&self) {
        for resource in Resource::ALL {
            if resource == Resource::InfraStatus && !self.sync.control_plane.is_configured() {
                tracing::info!("control plane not configured, infra status not polled");
                continue;
            }
            self.observe(resource).await;
        }
        tracing::info!("console observing");
    }

    /// Starts (or restarts) observing `resource`.
    pub async fn observe(&self, resource: Resource) {
        self.unobserve(resource).await;

        let sync = self.sync.clone();
        self.scheduler
            .schedule(resource, resource.poll_interval(), move || {
                let sync = sync.clone();
                async move { sync.poll(resource).await }
            })
            .await;

        let pump = push_source(resource).map(|(table, mask)| {
            let sync = self.sync.clone();
            spawn_pump(self.sync.store.clone(), table, mask, move |event| {
                let sync = sync.clone();
                async move { sync.apply_change(event).await }
            })
        });

        let observation = Observation::new(resource, Arc::clone(&self.scheduler), pump);
        self.observations.lock().await.insert(resource, observation);
        tracing::debug!(%resource, "observing");
    }

    /// Stops observing `resource`; its view keeps the last state.
    pub async fn unobserve(&self, resource: Resource) {
        let observation = self.observations.lock().await.remove(&resource);
        if let Some(observation) = observation {
            observation.cancel().await;
        }
    }

    /// Stops every observation.
    pub async fn shutdown(&self) {
        let observations: Vec<Observation> = self.observations.lock().await.drain().map(|(_, o)| o).collect();
        for observation in observations {
            observation.cancel().await;
        }
        self.scheduler.cancel_all().await;
        tracing::info!("console stopped");
    }

    /// Fetches `resource` now, outside its schedule.
    ///
    /// # Errors
    ///
    /// Returns the fetch's error; the view keeps its last state.
    pub async fn refresh(&self, resource: Resource) -> Result<(), ConsoleError> {
        self.sync.poll(resource).await
    }

    /// Event bus carrying [`ViewUpdate`]s.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.sync.bus
    }

    /// The reconciled views.
    #[must_use]
    pub fn views(&self) -> &ConsoleViews {
        &self.sync.views
    }

    /// Latest stats sample.
    pub async fn latest_stats(&self) -> Option<SystemStatsSample> {
        self.sync.views.stats.current(STATS_KEY).await
    }

    /// Active sessions, most recently updated first.
    #[must_use]
    pub fn sessions(&self) -> Vec<ActiveSession> {
        self.sync.views.sessions.current()
    }

    /// Newest log lines, at most `limit`.
    #[must_use]
    pub fn logs(&self, limit: usize) -> Vec<BotLogEntry> {
        take(self.sync.views.logs.current(), limit)
    }

    /// Newest usage records, at most `limit`.
    #[must_use]
    pub fn usage(&self, limit: usize) -> Vec<UsageRecord> {
        take(self.sync.views.usage.current(), limit)
    }

    /// Newest played tracks, at most `limit`.
    #[must_use]
    pub fn playback(&self, limit: usize) -> Vec<PlaybackRecord> {
        take(self.sync.views.playback.current(), limit)
    }

    /// A command's reconciled entry, read from the store when not cached.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::NotFound`] for an unknown id, or a store error.
    pub async fn command(&self, id: CommandId) -> Result<CommandQueueEntry, ConsoleError> {
        let key = id.to_string();
        if let Some(entry) = self.sync.views.commands.current(&key).await {
            return Ok(entry);
        }
        let rows: Vec<CommandQueueEntry> = self
            .sync
            .store
            .fetch(Table::CommandQueue, &ReadQuery::new().eq("id", key.clone()).limit(1))
            .await?;
        let Some(entry) = rows.into_iter().next() else {
            return Err(ConsoleError::NotFound(format!("command {id}")));
        };
        self.sync.apply_command(entry.clone(), UpdateSource::Poll).await;
        Ok(self.sync.views.commands.current(&key).await.unwrap_or(entry))
    }

    /// Checks every table and reports configured settings.
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.run().await
    }

    /// Enqueues a command.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::dispatch`].
    pub async fn dispatch(&self, command_type: CommandType, payload: Value) -> Result<CommandHandle, ConsoleError> {
        let handle = self.dispatcher.dispatch(command_type, payload).await?;
        self.sync.publish(
            Resource::CommandQueue,
            Some(handle.id().to_string()),
            UpdateSource::Local,
            handle.entry(),
        );
        Ok(handle)
    }

    /// Enqueues a session control (`pause`, `resume`, `skip`, `stop`) for a
    /// guild.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::InvalidCommand`] for other command types, otherwise
    /// see [`CommandDispatcher::dispatch`].
    pub async fn control_session(&self, guild_id: &str, command: CommandType) -> Result<CommandHandle, ConsoleError> {
        if !command.is_session_control() {
            return Err(ConsoleError::InvalidCommand(format!(
                "{command} is not a session control"
            )));
        }
        self.dispatch(command, serde_json::json!({ "guild_id": guild_id })).await
    }

    /// Analytics summary, computed on demand when no poll has produced one.
    ///
    /// # Errors
    ///
    /// Returns a store error when it has to be computed and the reads fail.
    pub async fn analytics(&self) -> Result<AnalyticsSummary, ConsoleError> {
        if let Some(summary) = self.sync.views.analytics.current() {
            return Ok(summary);
        }
        self.sync.poll(Resource::Analytics).await?;
        self.sync
            .views
            .analytics
            .current()
            .ok_or_else(|| ConsoleError::Internal("analytics unavailable".to_string()))
    }

    /// Per-day usage over `days` days.
    ///
    /// # Errors
    ///
    /// Returns a store error when the read fails.
    pub async fn usage_by_day(&self, days: u32) -> Result<Vec<DayBucket>, ConsoleError> {
        self.sync.analytics.usage_by_day(days, Utc::now()).await
    }

    /// Top `limit` played tracks.
    ///
    /// # Errors
    ///
    /// Returns a store error when the read fails.
    pub async fn top_tracks(&self, limit: usize) -> Result<Vec<Ranked>, ConsoleError> {
        self.sync.analytics.top_tracks(limit).await
    }

    /// Playlists; a user filter always reads through.
    ///
    /// # Errors
    ///
    /// Returns a store error when a read is needed and fails.
    pub async fn playlists(&self, user: Option<&str>) -> Result<Vec<PlaylistWithTracks>, ConsoleError> {
        if user.is_none_or(|u| u.trim().is_empty())
            && let Some(cached) = self.sync.views.playlists.current()
        {
            return Ok(cached);
        }
        self.sync.playlists.list(user).await
    }

    /// Renames a playlist.
    ///
    /// # Errors
    ///
    /// See [`PlaylistService::rename`].
    pub async fn rename_playlist(&self, id: uuid::Uuid, name: &str) -> Result<Playlist, ConsoleError> {
        let playlist = self.sync.playlists.rename(id, name).await?;
        self.after_playlist_write().await;
        Ok(playlist)
    }

    /// Deletes a playlist and its tracks.
    ///
    /// # Errors
    ///
    /// See [`PlaylistService::delete`].
    pub async fn delete_playlist(&self, id: uuid::Uuid) -> Result<(), ConsoleError> {
        self.sync.playlists.delete(id).await?;
        self.after_playlist_write().await;
        Ok(())
    }

    /// Appends a track.
    ///
    /// # Errors
    ///
    /// See [`PlaylistService::add_track`].
    pub async fn add_track(&self, playlist_id: uuid::Uuid, draft: TrackDraft) -> Result<PlaylistTrack, ConsoleError> {
        let track = self.sync.playlists.add_track(playlist_id, draft).await?;
        self.after_playlist_write().await;
        Ok(track)
    }

    /// Renames a track.
    ///
    /// # Errors
    ///
    /// See [`PlaylistService::update_track_title`].
    pub async fn update_track_title(&self, id: uuid::Uuid, title: &str) -> Result<PlaylistTrack, ConsoleError> {
        let track = self.sync.playlists.update_track_title(id, title).await?;
        self.after_playlist_write().await;
        Ok(track)
    }

    /// Deletes a track.
    ///
    /// # Errors
    ///
    /// See [`PlaylistService::delete_track`].
    pub async fn delete_track(&self, id: uuid::Uuid) -> Result<(), ConsoleError> {
        self.sync.playlists.delete_track(id).await?;
        self.after_playlist_write().await;
        Ok(())
    }

    async fn after_playlist_write(&self) {
        if let Err(err) = self.sync.refresh_playlists(Instant::now(), UpdateSource::Local).await {
            tracing::warn!(error = %err, "playlist view refresh failed");
        }
    }

    /// Hosting status, fetched live and recorded in the infra view.
    ///
    /// # Errors
    ///
    /// See [`KoyebClient::status`].
    pub async fn infra_status(&self) -> Result<ServiceStatus, ConsoleError> {
        let started = Instant::now();
        let status = self.sync.control_plane.status().await?;
        if self.sync.views.infra.offer(status.clone(), started).await {
            self.sync.publish(Resource::InfraStatus, None, UpdateSource::Local, &status);
        }
        Ok(status)
    }

    /// Triggers a redeploy of the worker.
    ///
    /// # Errors
    ///
    /// See [`KoyebClient::redeploy`].
    pub async fn redeploy(&self) -> Result<RedeployOutcome, ConsoleError> {
        self.sync.control_plane.redeploy().await
    }

    /// The current view of `resource` as a whole-view update, if there is
    /// anything to show.
    pub async fn snapshot(&self, resource: Resource) -> Option<ViewUpdate> {
        let views = &self.sync.views;
        let view = match resource {
            Resource::SystemStats => serde_json::to_value(views.stats.current(STATS_KEY).await?),
            Resource::ActiveSessions => serde_json::to_value(views.sessions.current()),
            Resource::BotLogs => serde_json::to_value(views.logs.current()),
            Resource::UsageLog => serde_json::to_value(views.usage.current()),
            Resource::PlaybackLog => serde_json::to_value(views.playback.current()),
            Resource::CommandQueue => {
                let mut entries = views.commands.values().await;
                entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                serde_json::to_value(entries)
            }
            Resource::InfraStatus => serde_json::to_value(views.infra.current()?),
            Resource::Analytics => serde_json::to_value(views.analytics.current()?),
            Resource::Playlists => serde_json::to_value(views.playlists.current()?),
        }
        .ok()?;
        Some(ViewUpdate::whole(resource, UpdateSource::Local, view))
    }
}

fn limit_u32(limit: usize) -> u32 {
    u32::try_from(limit).unwrap_or(u32::MAX)
}

fn take<T>(mut rows: Vec<T>, limit: usize) -> Vec<T> {
    rows.truncate(limit);
    rows
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::CommandStatus;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn console() -> (ConsoleService, MemoryStore) {
        let (store, memory) = TelemetryStore::in_memory();
        let service = ConsoleService::new(store, &ConsoleConfig::default(), EventBus::new(64));
        (service, memory)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn push_updates_stats_without_waiting_for_poll() {
        let (console, memory) = console();
        console.start().await;
        settle().await;

        let _ = memory
            .worker_insert(Table::SystemStats, json!({"cpu_usage": 12.5, "recorded_at": "2026-01-12T03:00:00Z"}))
            .await;
        settle().await;
        assert_eq!(console.latest_stats().await.and_then(|s| s.cpu_usage), Some(12.5));
        console.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lost_push_is_recovered_by_the_next_poll() {
        let (console, memory) = console();
        console.start().await;
        settle().await;

        memory.set_push_dropped(true);
        let _ = memory
            .worker_insert(Table::BotLogs, json!({"level": "error", "message": "boom"}))
            .await;
        settle().await;
        assert!(console.logs(50).is_empty());

        tokio::time::sleep(Resource::BotLogs.poll_interval()).await;
        let logs = console.logs(50);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.first().and_then(|l| l.message.clone()), Some("boom".to_string()));
        console.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stats_never_replace_newer_ones() {
        let (console, memory) = console();
        console.start().await;
        settle().await;

        let _ = memory
            .worker_insert(Table::SystemStats, json!({"cpu_usage": 2.0, "recorded_at": "2026-01-12T04:00:00Z"}))
            .await;
        let _ = memory
            .worker_insert(Table::SystemStats, json!({"cpu_usage": 1.0, "recorded_at": "2026-01-12T03:00:00Z"}))
            .await;
        tokio::time::sleep(Resource::SystemStats.poll_interval()).await;
        assert_eq!(console.latest_stats().await.and_then(|s| s.cpu_usage), Some(2.0));
        console.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn command_outcome_reaches_the_handle() {
        let (console, memory) = console();
        console.start().await;
        settle().await;

        let Ok(handle) = console.control_session("42", CommandType::Skip).await else {
            panic!("dispatch failed");
        };
        let _ = memory
            .worker_update(
                Table::CommandQueue,
                &handle.id().to_string(),
                json!({"status": "completed", "result": "skipped", "completed_at": Utc::now()}),
            )
            .await;

        let Ok(outcome) = handle.wait_for_outcome(Duration::from_secs(10)).await else {
            panic!("no outcome");
        };
        assert_eq!(outcome.status, CommandStatus::Completed);
        assert_eq!(outcome.result.as_deref(), Some("skipped"));

        let Ok(read_back) = console.command(handle.id()).await else {
            panic!("command lookup failed");
        };
        assert_eq!(read_back.status, CommandStatus::Completed);
        console.shutdown().await;
    }

    #[tokio::test]
    async fn command_view_stays_bounded_and_tracks_stuck_commands() {
        let (console, memory) = console();
        let Ok(stuck) = console.control_session("1", CommandType::Skip).await else {
            panic!("dispatch failed");
        };
        let stuck_id = stuck.id();
        drop(stuck);
        for _ in 0..120 {
            let _ = memory
                .worker_insert(
                    Table::CommandQueue,
                    json!({"command_type": "pause", "payload": {"guild_id": "1"}, "status": "completed"}),
                )
                .await;
        }

        assert!(console.refresh(Resource::CommandQueue).await.is_ok());
        assert_eq!(console.views().commands.values().await.len(), COMMAND_VIEW_LIMIT + 1);

        let _ = memory
            .worker_update(
                Table::CommandQueue,
                &stuck_id.to_string(),
                json!({"status": "in_progress"}),
            )
            .await;
        assert!(console.refresh(Resource::CommandQueue).await.is_ok());
        let current = console.views().commands.current(&stuck_id.to_string()).await;
        assert_eq!(current.map(|c| c.status), Some(CommandStatus::InProgress));
        assert_eq!(console.views().commands.values().await.len(), COMMAND_VIEW_LIMIT + 1);
    }

    #[tokio::test]
    async fn session_controls_reject_other_commands() {
        let (console, memory) = console();
        let err = console.control_session("42", CommandType::from("volume")).await.err();
        assert!(matches!(err, Some(ConsoleError::InvalidCommand(_))));
        assert_eq!(memory.row_count(Table::CommandQueue).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_delete_is_pushed_and_not_resurrected() {
        let (console, memory) = console();
        console.start().await;
        settle().await;

        let _ = memory
            .worker_upsert(Table::ActiveSessions, json!({"guild_id": "g1", "track_title": "Lemon"}))
            .await;
        settle().await;
        assert_eq!(console.sessions().len(), 1);

        let _ = memory.worker_delete(Table::ActiveSessions, "g1").await;
        settle().await;
        assert!(console.sessions().is_empty());

        tokio::time::sleep(Resource::ActiveSessions.poll_interval()).await;
        assert!(console.sessions().is_empty());
        console.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn outage_keeps_the_last_view() {
        let (console, memory) = console();
        let _ = memory
            .worker_insert(Table::BotLogs, json!({"level": "info", "message": "before"}))
            .await;
        console.start().await;
        settle().await;
        assert_eq!(console.logs(50).len(), 1);

        memory.set_unavailable(true);
        tokio::time::sleep(Resource::BotLogs.poll_interval() * 2).await;
        assert_eq!(console.logs(50).len(), 1);
        console.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unobserved_resource_ignores_late_events() {
        let (console, memory) = console();
        console.observe(Resource::SystemStats).await;
        settle().await;
        console.unobserve(Resource::SystemStats).await;

        let _ = memory.inject(ChangeEvent {
            table: Table::SystemStats,
            kind: ChangeKind::Insert,
            new_row: crate::store::to_row(&json!({"cpu_usage": 9.0, "recorded_at": "2026-01-12T03:00:00Z"})).ok(),
            old_row: None,
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(console.latest_stats().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn view_updates_are_published_once_per_change() {
        let (console, memory) = console();
        let mut rx = console.event_bus().subscribe();
        console.observe(Resource::BotLogs).await;
        settle().await;

        let _ = memory
            .worker_insert(Table::BotLogs, json!({"level": "warn", "message": "hi"}))
            .await;
        settle().await;
        tokio::time::sleep(Resource::BotLogs.poll_interval()).await;

        let Ok(update) = rx.try_recv() else {
            panic!("expected one update");
        };
        assert_eq!(update.resource, Resource::BotLogs);
        assert!(rx.try_recv().is_err());
        console.shutdown().await;
    }

    #[tokio::test]
    async fn snapshot_reflects_current_views() {
        let (console, memory) = console();
        assert!(console.snapshot(Resource::SystemStats).await.is_none());
        let _ = memory
            .worker_insert(Table::MusicHistory, json!({"track_title": "Idol"}))
            .await;
        assert!(console.refresh(Resource::PlaybackLog).await.is_ok());
        let Some(update) = console.snapshot(Resource::PlaybackLog).await else {
            panic!("missing snapshot");
        };
        assert_eq!(update.view.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn infra_without_credentials_is_a_configuration_error() {
        let (console, _memory) = console();
        assert!(matches!(
            console.infra_status().await,
            Err(ConsoleError::Configuration(_))
        ));
        assert!(matches!(console.redeploy().await, Err(ConsoleError::Configuration(_))));
    }
}
