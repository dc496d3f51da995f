//! In-process store used by tests and `STORE_BACKEND=memory`.
//!
//! Behaves like the PostgreSQL schema where the console can observe it:
//! serial/UUID keys and insert timestamps are filled in, `updated_at` is
//! touched on update, duplicate keys are rejected with SQLSTATE `23505`, and
//! every write emits a [`ChangeEvent`]. Outages and lost push notifications
//! can be switched on to exercise the console's degraded paths.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64};
use std::sync::atomic::Ordering as AtomicOrdering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use super::query::{Direction, Filter, ReadQuery};
use super::{KeyKind, Row, StoreBackend, Table, to_row};
use crate::error::StoreError;
use crate::feed::{ChangeEvent, ChangeKind, MemoryChangeFeed};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_FEED_BUFFER: usize = 256;

/// Shared in-memory tables. Cloning yields another handle on the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    next_serial: AtomicI64,
    changes: broadcast::Sender<ChangeEvent>,
    unavailable: AtomicBool,
    push_dropped: AtomicBool,
}

impl MemoryStore {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(HashMap::new()),
                next_serial: AtomicI64::new(1),
                changes,
                unavailable: AtomicBool::new(false),
                push_dropped: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a change feed observing this store.
    #[must_use]
    pub fn feed(&self) -> MemoryChangeFeed {
        self.feed_with_buffer(DEFAULT_FEED_BUFFER)
    }

    /// Returns a change feed with a custom per-subscription buffer.
    #[must_use]
    pub fn feed_with_buffer(&self, buffer: usize) -> MemoryChangeFeed {
        MemoryChangeFeed::new(self.inner.changes.clone(), buffer)
    }

    /// Makes every operation fail with code `unavailable` while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Silently drops change notifications while `true`.
    pub fn set_push_dropped(&self, dropped: bool) {
        self.inner.push_dropped.store(dropped, AtomicOrdering::SeqCst);
    }

    /// Emits a synthetic change event, bypassing the drop switch.
    ///
    /// Returns the number of live feed receivers.
    pub fn inject(&self, event: ChangeEvent) -> usize {
        self.inner.changes.send(event).unwrap_or(0)
    }

    /// Number of rows currently in `table`.
    pub async fn row_count(&self, table: Table) -> usize {
        self.inner
            .tables
            .read()
            .await
            .get(&table)
            .map_or(0, Vec::len)
    }

    /// Inserts a row as the worker would, ignoring the console allowlist.
    ///
    /// # Errors
    ///
    /// Same as [`StoreBackend::insert`].
    pub async fn worker_insert(&self, table: Table, row: Value) -> Result<Row, StoreError> {
        self.insert(table, object(row)?).await
    }

    /// Updates a row as the worker would.
    ///
    /// # Errors
    ///
    /// Same as [`StoreBackend::update`].
    pub async fn worker_update(&self, table: Table, key: &str, patch: Value) -> Result<Row, StoreError> {
        self.update(table, key, object(patch)?).await
    }

    /// Inserts or replaces a row by key, as the worker's upsert does.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store is unavailable or the row has
    /// no key.
    pub async fn worker_upsert(&self, table: Table, row: Value) -> Result<Row, StoreError> {
        let row = object(row)?;
        let key = row
            .get(table.key_column())
            .and_then(value_text)
            .ok_or_else(|| StoreError::with_code("upsert needs a key", "not_null_violation"))?;
        let exists = {
            let tables = self.inner.tables.read().await;
            tables
                .get(&table)
                .is_some_and(|rows| find_index(table, rows, &key).is_some())
        };
        if exists {
            self.update(table, &key, row).await
        } else {
            self.insert(table, row).await
        }
    }

    /// Deletes a row as the worker would.
    ///
    /// # Errors
    ///
    /// Same as [`StoreBackend::delete`].
    pub async fn worker_delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.delete(table, key).await
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.load(AtomicOrdering::SeqCst) {
            Err(StoreError::with_code("store unavailable", "unavailable"))
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: ChangeEvent) {
        if self.inner.push_dropped.load(AtomicOrdering::SeqCst) {
            tracing::trace!(table = event.table.name(), "dropping change notification");
            return;
        }
        let _ = self.inner.changes.send(event);
    }

    fn fill_defaults(&self, table: Table, row: &mut Row) {
        let key = table.key_column();
        if row.get(key).is_none_or(Value::is_null) {
            match table.key_kind() {
                KeyKind::Serial => {
                    let id = self.inner.next_serial.fetch_add(1, AtomicOrdering::SeqCst);
                    row.insert(key.to_string(), Value::from(id));
                }
                KeyKind::Uuid => {
                    row.insert(key.to_string(), Value::from(uuid::Uuid::new_v4().to_string()));
                }
                KeyKind::Natural => {}
            }
        }
        let stamp = table.stamp_column();
        if row.get(stamp).is_none_or(Value::is_null) {
            row.insert(stamp.to_string(), Value::from(Utc::now().to_rfc3339()));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn read(&self, table: Table, query: &ReadQuery) -> Result<Vec<Row>, StoreError> {
        self.check_available()?;
        query.validate(table)?;
        let tables = self.inner.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        if let Some(order) = query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(order.column), b.get(order.column));
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, StoreError> {
        self.check_available()?;
        for column in row.keys() {
            table.check_column(column)?;
        }
        self.fill_defaults(table, &mut row);
        let key = row
            .get(table.key_column())
            .and_then(value_text)
            .ok_or_else(|| StoreError::with_code("missing key", "not_null_violation"))?;

        let mut tables = self.inner.tables.write().await;
        let rows = tables.entry(table).or_default();
        if find_index(table, rows, &key).is_some() {
            return Err(StoreError::with_code(
                format!("duplicate key {key} in {}", table.name()),
                "23505",
            ));
        }
        rows.push(row.clone());
        drop(tables);

        self.emit(ChangeEvent {
            table,
            kind: ChangeKind::Insert,
            new_row: Some(row.clone()),
            old_row: None,
        });
        Ok(row)
    }

    async fn update(&self, table: Table, key: &str, patch: Row) -> Result<Row, StoreError> {
        self.check_available()?;
        for column in patch.keys() {
            table.check_column(column)?;
        }
        let mut tables = self.inner.tables.write().await;
        let rows = tables.entry(table).or_default();
        let Some(index) = find_index(table, rows, key) else {
            return Err(not_found(table, key));
        };
        let Some(stored) = rows.get_mut(index) else {
            return Err(not_found(table, key));
        };
        let old = stored.clone();
        let touched = table.touches_updated_at() && !patch.contains_key("updated_at");
        stored.extend(patch);
        if touched {
            stored.insert("updated_at".to_string(), Value::from(Utc::now().to_rfc3339()));
        }
        let new = stored.clone();
        drop(tables);

        self.emit(ChangeEvent {
            table,
            kind: ChangeKind::Update,
            new_row: Some(new.clone()),
            old_row: Some(old),
        });
        Ok(new)
    }

    async fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.inner.tables.write().await;
        let rows = tables.entry(table).or_default();
        let Some(index) = find_index(table, rows, key) else {
            return Err(not_found(table, key));
        };
        let old = rows.remove(index);
        if table == Table::Playlists
            && let Some(children) = tables.get_mut(&Table::PlaylistTracks)
        {
            children.retain(|track| {
                track.get("playlist_id").and_then(value_text).as_deref() != Some(key)
            });
        }
        drop(tables);

        self.emit(ChangeEvent {
            table,
            kind: ChangeKind::Delete,
            new_row: None,
            old_row: Some(old),
        });
        Ok(())
    }
}

fn object(value: Value) -> Result<Row, StoreError> {
    to_row(&value)
}

fn not_found(table: Table, key: &str) -> StoreError {
    StoreError::with_code(format!("no row {key} in {}", table.name()), "not_found")
}

fn find_index(table: Table, rows: &[Row], key: &str) -> Option<usize> {
    rows.iter().position(|row| {
        row.get(table.key_column())
            .and_then(value_text)
            .as_deref()
            == Some(key)
    })
}

/// Text form used for equality, mirroring `column::text = $1`.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => match value {
            Value::Null => row.get(*column).is_none_or(Value::is_null),
            expected => row.get(*column).and_then(value_text) == value_text(expected),
        },
        Filter::Contains { column, needle } => row
            .get(*column)
            .and_then(value_text)
            .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
        Filter::AnyOf { column, values } => row
            .get(*column)
            .and_then(value_text)
            .is_some_and(|text| values.contains(&text)),
        Filter::Compare { column, op, at } => {
            parse_timestamp(row.get(*column)).is_some_and(|ts| op.holds(ts, *at))
        }
    }
}

/// Orders nulls first, then timestamps, numbers, booleans, and text.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (parse_timestamp(Some(a)), parse_timestamp(Some(b))) {
                return x.cmp(&y);
            }
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            if let (Some(x), Some(y)) = (a.as_bool(), b.as_bool()) {
                return x.cmp(&y);
            }
            value_text(a).cmp(&value_text(b))
        }
    }
}
