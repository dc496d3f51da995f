//! Usage and playback analytics built from bulk reads.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::aggregator::{DayBucket, FieldFn, Ranked, UsageTotals, bucket_by_day, top_n, usage_totals};
use crate::domain::{PlaybackRecord, UsageRecord};
use crate::error::ConsoleError;
use crate::store::{ReadQuery, Table, TelemetryStore};

const USAGE_FIELDS: [(&str, FieldFn<UsageRecord>); 3] = [
    ("prompt_tokens", |r| r.prompt_tokens),
    ("completion_tokens", |r| r.completion_tokens),
    ("total_tokens", |r| r.total_tokens),
];

/// Derived analytics shown on the console's analytics view.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AnalyticsSummary {
    /// Per-day usage over the configured window, oldest first.
    pub usage_by_day: Vec<DayBucket>,
    /// Usage since UTC midnight.
    pub usage_today: UsageTotals,
    /// Most played tracks.
    pub top_tracks: Vec<Ranked>,
}

/// Runs the analytics reads and aggregations.
#[derive(Debug, Clone)]
pub struct AnalyticsService {
    store: TelemetryStore,
    window_days: u32,
    row_cap: u32,
    top_tracks_limit: usize,
}

impl AnalyticsService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: TelemetryStore, window_days: u32, row_cap: u32, top_tracks_limit: usize) -> Self {
        Self {
            store,
            window_days,
            row_cap,
            top_tracks_limit,
        }
    }

    /// Per-day usage for the last `days` days (including today).
    ///
    /// # Errors
    ///
    /// Returns a [`ConsoleError::Store`] when the read fails.
    pub async fn usage_by_day(&self, days: u32, now: DateTime<Utc>) -> Result<Vec<DayBucket>, ConsoleError> {
        let since = window_start(now, days);
        let records: Vec<UsageRecord> = self
            .store
            .fetch(
                Table::GeminiUsage,
                &ReadQuery::new()
                    .since("recorded_at", since)
                    .oldest_first("recorded_at")
                    .limit(self.row_cap),
            )
            .await?;
        Ok(bucket_by_day(&records, |r| Some(r.recorded_at.date_naive()), &USAGE_FIELDS))
    }

    /// Usage since UTC midnight.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsoleError::Store`] when the read fails.
    pub async fn usage_today(&self, now: DateTime<Utc>) -> Result<UsageTotals, ConsoleError> {
        let records: Vec<UsageRecord> = self
            .store
            .fetch(
                Table::GeminiUsage,
                &ReadQuery::new()
                    .since("recorded_at", window_start(now, 1))
                    .limit(self.row_cap),
            )
            .await?;
        Ok(usage_totals(&records))
    }

    /// The `limit` most played tracks among the latest rows.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsoleError::Store`] when the read fails.
    pub async fn top_tracks(&self, limit: usize) -> Result<Vec<Ranked>, ConsoleError> {
        let records: Vec<PlaybackRecord> = self
            .store
            .fetch(
                Table::MusicHistory,
                &ReadQuery::new().newest_first("recorded_at").limit(self.row_cap),
            )
            .await?;
        Ok(top_n(&records, |r| r.track_title.clone(), limit))
    }

    /// Builds the full summary with the configured window and limits.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsoleError::Store`] when any read fails.
    pub async fn summary(&self, now: DateTime<Utc>) -> Result<AnalyticsSummary, ConsoleError> {
        let (usage_by_day, usage_today, top_tracks) = tokio::try_join!(
            self.usage_by_day(self.window_days, now),
            self.usage_today(now),
            self.top_tracks(self.top_tracks_limit),
        )?;
        Ok(AnalyticsSummary {
            usage_by_day,
            usage_today,
            top_tracks,
        })
    }
}

/// UTC midnight `days - 1` days before `now`; `days` of zero means today.
fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let back = i64::from(days.max(1) - 1);
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now, |dt| dt.and_utc());
    midnight - ChronoDuration::days(back)
}
