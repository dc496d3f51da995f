//! Change notifications from the shared store.
//!
//! A [`ChangeFeed`] hands out [`Subscription`]s: per-table streams of
//! [`ChangeEvent`]s filtered by an [`EventMask`]. Delivery is best-effort.
//! Events may be lost (reconnects, full buffers) and the console's polling
//! covers for that, so nothing here retries or replays.

pub mod memory;
pub mod postgres;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use memory::MemoryChangeFeed;
pub use postgres::PgChangeFeed;

use crate::error::StoreError;
use crate::store::{Row, Table};

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

impl ChangeKind {
    /// Parses the trigger's `TG_OP` spelling, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Which change kinds a subscriber wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    /// Deliver inserts.
    pub insert: bool,
    /// Deliver updates.
    pub update: bool,
    /// Deliver deletes.
    pub delete: bool,
}

impl EventMask {
    /// Every change kind.
    pub const ALL: Self = Self {
        insert: true,
        update: true,
        delete: true,
    };

    /// Inserts only (append-only tables).
    pub const INSERT: Self = Self {
        insert: true,
        update: false,
        delete: false,
    };

    /// Inserts and updates.
    pub const INSERT_UPDATE: Self = Self {
        insert: true,
        update: true,
        delete: false,
    };

    /// Whether `kind` passes the mask.
    #[must_use]
    pub const fn contains(self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }
}

/// One row change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Table the row belongs to.
    pub table: Table,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Row after the change (absent for deletes).
    pub new_row: Option<Row>,
    /// Row before the change (updates and deletes, when available).
    pub old_row: Option<Row>,
}

impl ChangeEvent {
    /// The row that best identifies the change: the new row, or the old one
    /// for deletes.
    #[must_use]
    pub fn row(&self) -> Option<&Row> {
        self.new_row.as_ref().or(self.old_row.as_ref())
    }
}

/// Source of per-table change subscriptions.
#[async_trait]
pub trait ChangeFeed: Send + Sync + fmt::Debug {
    /// Opens a subscription for `table`, delivering kinds in `mask`.
    async fn subscribe(&self, table: Table, mask: EventMask) -> Result<Subscription, StoreError>;
}

/// Write half handed to a feed's forwarding task.
#[derive(Debug, Clone)]
pub struct EventSink {
    table: Table,
    mask: EventMask,
    tx: mpsc::Sender<ChangeEvent>,
}

impl EventSink {
    /// Whether an event of `kind` on `table` would reach the subscriber.
    #[must_use]
    pub fn accepts(&self, table: Table, kind: ChangeKind) -> bool {
        table == self.table && self.mask.contains(kind)
    }

    /// Offers an event to the subscriber.
    ///
    /// Events for other tables or masked-out kinds are ignored. When the
    /// subscriber's buffer is full the event is dropped. Returns `false`
    /// once the subscriber is gone and forwarding should stop.
    pub fn deliver(&self, event: ChangeEvent) -> bool {
        if !self.accepts(event.table, event.kind) {
            return true;
        }
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    table = self.table.name(),
                    kind = %event.kind,
                    "change buffer full, dropping notification"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// A live stream of changes for one table.
///
/// Dropping the subscription stops its forwarder; [`Subscription::unsubscribe`]
/// additionally waits for it to finish.
#[derive(Debug)]
pub struct Subscription {
    table: Table,
    rx: mpsc::Receiver<ChangeEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawns `forward` with a sink bound to `table` and `mask`.
    pub fn spawn<F, Fut>(table: Table, mask: EventMask, buffer: usize, forward: F) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = EventSink { table, mask, tx };
        let forwarder = tokio::spawn(forward(sink));
        Self {
            table,
            rx,
            forwarder: Some(forwarder),
        }
    }

    /// Table this subscription observes.
    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    /// Waits for the next event. `None` means the stream has ended and the
    /// caller should resubscribe.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Stops the forwarder and waits until it has exited. No event is
    /// delivered afterwards.
    pub async fn unsubscribe(mut self) {
        self.rx.close();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            let _ = forwarder.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
