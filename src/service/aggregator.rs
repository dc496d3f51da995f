//! Pure aggregation over bulk-fetched rows.
//!
//! Accuracy is bounded by the row cap of the read that produced the input;
//! nothing here touches the store.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::UsageRecord;

/// Extracts a numeric field from a record; `None` counts as zero.
pub type FieldFn<R> = fn(&R) -> Option<i64>;

/// Records of one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DayBucket {
    /// UTC date.
    pub date: NaiveDate,
    /// Number of records in the bucket.
    pub count: u64,
    /// Per-field sums, keyed by field name.
    pub sums: BTreeMap<String, i64>,
}

impl DayBucket {
    /// Sum of `field`, zero when the field was not aggregated.
    #[must_use]
    pub fn sum(&self, field: &str) -> i64 {
        self.sums.get(field).copied().unwrap_or(0)
    }
}

/// A key with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Ranked {
    /// Grouping key (e.g. track title).
    pub key: String,
    /// Occurrences.
    pub count: u64,
}

/// Request count and token sums over a set of usage records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UsageTotals {
    /// Number of records.
    pub requests: u64,
    /// Prompt tokens.
    pub prompt_tokens: i64,
    /// Completion tokens.
    pub completion_tokens: i64,
    /// Total tokens.
    pub total_tokens: i64,
}

/// Groups `records` by UTC calendar day and sums `fields`.
///
/// Buckets appear in first-seen order, so callers pass records sorted
/// ascending. Records without a date are skipped.
pub fn bucket_by_day<R, D>(records: &[R], date_of: D, fields: &[(&str, FieldFn<R>)]) -> Vec<DayBucket>
where
    D: Fn(&R) -> Option<NaiveDate>,
{
    let mut buckets: Vec<DayBucket> = Vec::new();
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();

    for record in records {
        let Some(date) = date_of(record) else {
            continue;
        };
        let slot = *index.entry(date).or_insert_with(|| {
            buckets.push(DayBucket {
                date,
                count: 0,
                sums: fields.iter().map(|(name, _)| ((*name).to_string(), 0)).collect(),
            });
            buckets.len() - 1
        });
        let Some(bucket) = buckets.get_mut(slot) else {
            continue;
        };
        bucket.count = bucket.count.saturating_add(1);
        for (name, value) in fields {
            let add = value(record).unwrap_or(0);
            let sum = bucket.sums.entry((*name).to_string()).or_insert(0);
            *sum = sum.saturating_add(add);
        }
    }
    buckets
}

/// Counts records per key and keeps the `n` most frequent.
///
/// Ties keep first-encountered order. Records without a key are skipped.
pub fn top_n<R, K>(records: &[R], key_of: K, n: usize) -> Vec<Ranked>
where
    K: Fn(&R) -> Option<String>,
{
    let mut ranked: Vec<Ranked> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(key) = key_of(record).filter(|k| !k.is_empty()) else {
            continue;
        };
        match index.get(&key) {
            Some(&slot) => {
                if let Some(entry) = ranked.get_mut(slot) {
                    entry.count = entry.count.saturating_add(1);
                }
            }
            None => {
                index.insert(key.clone(), ranked.len());
                ranked.push(Ranked { key, count: 1 });
            }
        }
    }
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

/// Sums usage records.
#[must_use]
pub fn usage_totals(records: &[UsageRecord]) -> UsageTotals {
    records.iter().fold(UsageTotals::default(), |acc, r| UsageTotals {
        requests: acc.requests.saturating_add(1),
        prompt_tokens: acc.prompt_tokens.saturating_add(r.prompt()),
        completion_tokens: acc.completion_tokens.saturating_add(r.completion()),
        total_tokens: acc.total_tokens.saturating_add(r.total()),
    })
}

/// Parses the UTC date of a timestamp string.
///
/// Accepts RFC 3339 and naive ISO forms (`2026-01-12T03:00`,
/// `2026-01-12 03:00:00`, `2026-01-12`). Naive values are taken as UTC.
#[must_use]
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    const NAIVE: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}
