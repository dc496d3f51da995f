//! Change feed backed by PostgreSQL `LISTEN`/`NOTIFY`.
//!
//! The schema's triggers publish every row change on [`CHANGE_CHANNEL`] as
//! `{"table", "type", "record", "old_record"}`. Rows too large for a NOTIFY
//! payload arrive as `{"table", "type", "key", "truncated": true}` and are
//! re-read before delivery. Each subscription holds its own [`PgListener`]
//! connection.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;

use super::{ChangeEvent, ChangeFeed, ChangeKind, EventMask, Subscription};
use crate::error::StoreError;
use crate::store::{PostgresStore, ReadQuery, Row, StoreBackend, Table};

/// Notification channel the schema triggers publish on.
pub const CHANGE_CHANNEL: &str = "console_changes";

/// Feed over PostgreSQL notifications.
#[derive(Debug, Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
    buffer: usize,
}

impl PgChangeFeed {
    /// Creates a feed that opens listeners from `pool`.
    #[must_use]
    pub fn new(pool: PgPool, buffer: usize) -> Self {
        Self { pool, buffer }
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    table: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Row>,
    #[serde(default)]
    old_record: Option<Row>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    truncated: bool,
}

/// A parsed notification.
#[derive(Debug, PartialEq)]
enum Notice {
    /// The payload carried the rows.
    Full(ChangeEvent),
    /// The row was too large to ship; only its key is known.
    Truncated {
        table: Table,
        kind: ChangeKind,
        key: String,
    },
}

/// Parses one notification payload.
///
/// Returns `None` for unknown tables or operations, and for truncated
/// notices without a key.
fn parse_payload(payload: &str) -> Option<Notice> {
    let notification: Notification = match serde_json::from_str(payload) {
        Ok(n) => n,
        Err(err) => {
            tracing::warn!(error = %err, "malformed change notification");
            return None;
        }
    };
    let table = Table::from_name(&notification.table)?;
    let kind = ChangeKind::parse(&notification.kind)?;
    if notification.truncated {
        return Some(Notice::Truncated {
            table,
            kind,
            key: notification.key?,
        });
    }
    Some(Notice::Full(ChangeEvent {
        table,
        kind,
        new_row: notification.record,
        old_row: notification.old_record,
    }))
}

/// Rebuilds the event for a truncated notice.
///
/// Deletes carry the key alone. Other kinds re-read the row; a failed or
/// empty read yields `None` and the next poll catches up.
async fn resolve_truncated(
    store: &PostgresStore,
    table: Table,
    kind: ChangeKind,
    key: String,
) -> Option<ChangeEvent> {
    if kind == ChangeKind::Delete {
        let mut old_row = Row::new();
        old_row.insert(table.key_column().to_string(), key.into());
        return Some(ChangeEvent {
            table,
            kind,
            new_row: None,
            old_row: Some(old_row),
        });
    }
    let query = ReadQuery::new().eq(table.key_column(), key.as_str()).limit(1);
    match store.read(table, &query).await {
        Ok(rows) => rows.into_iter().next().map(|row| ChangeEvent {
            table,
            kind,
            new_row: Some(row),
            old_row: None,
        }),
        Err(err) => {
            tracing::warn!(table = table.name(), %key, error = %err, "re-reading oversized row failed");
            None
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, table: Table, mask: EventMask) -> Result<Subscription, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        let store = PostgresStore::new(self.pool.clone());
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::debug!(table = table.name(), "listening for changes");

        Ok(Subscription::spawn(table, mask, self.buffer, move |sink| async move {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        let event = match parse_payload(notification.payload()) {
                            Some(Notice::Full(event)) => event,
                            Some(Notice::Truncated { table: changed, kind, key }) => {
                                if !sink.accepts(changed, kind) {
                                    continue;
                                }
                                match resolve_truncated(&store, changed, kind, key).await {
                                    Some(event) => event,
                                    None => continue,
                                }
                            }
                            None => continue,
                        };
                        if !sink.deliver(event) {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::warn!(
                            table = table.name(),
                            "listener connection lost, reconnecting; changes may be missed"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(table = table.name(), error = %err, "change listener failed");
                        break;
                    }
                }
            }
        }))
    }
}
