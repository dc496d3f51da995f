//! Keyed collections: capped recency lists and keyed sets.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::{RwLock, watch};
use tokio::time::Instant;

use super::{Applied, Versioned};

const TOMBSTONE_CAPACITY: usize = 256;

#[derive(Debug)]
struct Entry<T> {
    row: T,
    applied_at: Instant,
}

#[derive(Debug)]
struct Tombstone<V> {
    version: Option<V>,
    at: Instant,
}

#[derive(Debug)]
struct State<T: Versioned> {
    rows: HashMap<String, Entry<T>>,
    tombstones: HashMap<String, Tombstone<T::Version>>,
    tombstone_order: VecDeque<String>,
}

impl<T: Versioned> State<T> {
    fn bury(&mut self, key: String, version: Option<T::Version>, at: Instant) {
        if self.tombstones.insert(key.clone(), Tombstone { version, at }).is_none() {
            self.tombstone_order.push_back(key);
        }
        while self.tombstone_order.len() > TOMBSTONE_CAPACITY {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }

    fn lift(&mut self, key: &str) {
        if self.tombstones.remove(key).is_some() {
            self.tombstone_order.retain(|k| k != key);
        }
    }

    /// Admits `candidate` unless a tombstone or a newer row blocks it.
    fn admit(&mut self, candidate: T, now: Instant) {
        let key = candidate.row_key();
        let version = candidate.version();
        let blocked = self
            .tombstones
            .get(&key)
            .map(|t| !matches!(&t.version, Some(buried) if version > *buried));
        match blocked {
            Some(true) => return,
            Some(false) => self.lift(&key),
            None => {}
        }
        if let Some(existing) = self.rows.get(&key)
            && version <= existing.row.version()
        {
            return;
        }
        self.rows.insert(
            key,
            Entry {
                row: candidate,
                applied_at: now,
            },
        );
    }

    /// Sorted, capped view; rows beyond the cap are evicted.
    fn view(&mut self, capacity: Option<usize>) -> Vec<T> {
        let mut rows: Vec<T> = self.rows.values().map(|e| e.row.clone()).collect();
        rows.sort_by(|a, b| {
            b.version()
                .cmp(&a.version())
                .then_with(|| a.row_key().cmp(&b.row_key()))
        });
        if let Some(cap) = capacity
            && rows.len() > cap
        {
            for evicted in rows.split_off(cap) {
                self.rows.remove(&evicted.row_key());
            }
        }
        rows
    }
}

fn signature<T: Versioned>(rows: &[T]) -> Vec<(String, T::Version)> {
    rows.iter().map(|r| (r.row_key(), r.version())).collect()
}

/// A set of rows merged by key, sorted by version descending.
///
/// With a capacity it behaves as a recency list (logs, usage, playback);
/// without one as a keyed set (active sessions).
#[derive(Debug)]
pub struct CollectionReconciler<T: Versioned> {
    capacity: Option<usize>,
    state: RwLock<State<T>>,
    tx: watch::Sender<Vec<T>>,
}

impl<T: Versioned> CollectionReconciler<T> {
    /// Creates a reconciler; `capacity` caps the view length.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            state: RwLock::new(State {
                rows: HashMap::new(),
                tombstones: HashMap::new(),
                tombstone_order: VecDeque::new(),
            }),
            tx: watch::channel(Vec::new()).0,
        }
    }

    /// Merges a batch of candidates (a poll page or a single push).
    pub async fn merge(&self, rows: Vec<T>) -> Applied<Vec<T>> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        for row in rows {
            state.admit(row, now);
        }
        let view = state.view(self.capacity);
        drop(state);
        self.publish(view)
    }

    /// Merges a single candidate.
    pub async fn upsert(&self, row: T) -> Applied<Vec<T>> {
        self.merge(vec![row]).await
    }

    /// Removes `key` and buries it so stale re-deliveries cannot bring it
    /// back. `version` is the deleted row's version when known; otherwise
    /// the shown row's version is used.
    pub async fn remove(&self, key: &str, version: Option<T::Version>) -> Applied<Vec<T>> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        let removed = state.rows.remove(key);
        let buried = match (version, removed) {
            (Some(v), Some(entry)) => Some(std::cmp::max(v, entry.row.version())),
            (Some(v), None) => Some(v),
            (None, Some(entry)) => Some(entry.row.version()),
            (None, None) => None,
        };
        state.bury(key.to_string(), buried, now);
        let view = state.view(self.capacity);
        drop(state);
        self.publish(view)
    }

    /// Applies a complete poll of a keyed set fetched starting at
    /// `started_at`.
    ///
    /// Rows absent from the snapshot are dropped unless they were applied
    /// after the poll started. Tombstones older than the poll are lifted for
    /// rows the snapshot contains.
    pub async fn apply_snapshot(&self, rows: Vec<T>, started_at: Instant) -> Applied<Vec<T>> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        let present: HashSet<String> = rows.iter().map(Versioned::row_key).collect();

        let stale: Vec<String> = state
            .rows
            .iter()
            .filter(|(key, entry)| !present.contains(*key) && entry.applied_at < started_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(entry) = state.rows.remove(&key) {
                state.bury(key, Some(entry.row.version()), now);
            }
        }

        for row in rows {
            let key = row.row_key();
            if state
                .tombstones
                .get(&key)
                .is_some_and(|t| t.at < started_at)
            {
                state.lift(&key);
            }
            state.admit(row, now);
        }
        let view = state.view(self.capacity);
        drop(state);
        self.publish(view)
    }

    /// Current view.
    #[must_use]
    pub fn current(&self) -> Vec<T> {
        self.tx.borrow().clone()
    }

    /// Receiver over the view.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.tx.subscribe()
    }

    fn publish(&self, view: Vec<T>) -> Applied<Vec<T>> {
        let next = signature(&view);
        let changed = self.tx.send_if_modified(|shown| {
            if signature(shown) == next {
                false
            } else {
                *shown = view.clone();
                true
            }
        });
        Applied {
            current: view,
            changed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        version: u32,
    }

    impl Versioned for Row {
        type Version = u32;

        fn row_key(&self) -> String {
            self.id.to_string()
        }

        fn version(&self) -> u32 {
            self.version
        }
    }

    fn row(id: u32, version: u32) -> Row {
        Row { id, version }
    }

    fn ids(rows: &[Row]) -> Vec<u32> {
        rows.iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn merge_dedupes_sorts_and_caps() {
        let reconciler = CollectionReconciler::new(Some(3));
        reconciler.merge(vec![row(1, 10), row(2, 20), row(3, 30)]).await;
        let applied = reconciler.merge(vec![row(2, 20), row(4, 40)]).await;
        assert!(applied.changed);
        assert_eq!(ids(&applied.current), vec![4, 3, 2]);

        let again = reconciler.upsert(row(4, 40)).await;
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn evicted_rows_do_not_come_back() {
        let reconciler = CollectionReconciler::new(Some(2));
        reconciler.merge(vec![row(1, 1), row(2, 2), row(3, 3)]).await;
        let applied = reconciler.upsert(row(1, 1)).await;
        assert!(!applied.changed);
        assert_eq!(ids(&reconciler.current()), vec![3, 2]);
    }

    #[tokio::test]
    async fn older_version_never_replaces_newer() {
        let reconciler = CollectionReconciler::new(None);
        reconciler.upsert(row(1, 5)).await;
        let applied = reconciler.upsert(row(1, 4)).await;
        assert!(!applied.changed);
        assert_eq!(reconciler.current(), vec![row(1, 5)]);
    }

    #[tokio::test]
    async fn tombstone_blocks_stale_redelivery_until_newer_version() {
        let reconciler = CollectionReconciler::new(None);
        reconciler.upsert(row(7, 3)).await;
        assert!(reconciler.remove("7", None).await.changed);
        assert!(!reconciler.upsert(row(7, 3)).await.changed);
        assert!(reconciler.current().is_empty());

        assert!(reconciler.upsert(row(7, 4)).await.changed);
        assert_eq!(reconciler.current(), vec![row(7, 4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_drops_rows_missing_from_the_poll() {
        let reconciler = CollectionReconciler::new(None);
        reconciler.merge(vec![row(1, 1), row(2, 1)]).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let started = Instant::now();
        let applied = reconciler.apply_snapshot(vec![row(1, 1)], started).await;
        assert!(applied.changed);
        assert_eq!(ids(&applied.current), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_keeps_rows_pushed_after_the_poll_started() {
        let reconciler = CollectionReconciler::new(None);
        let started = Instant::now();
        tokio::time::advance(Duration::from_millis(10)).await;
        reconciler.upsert(row(9, 1)).await;

        let applied = reconciler.apply_snapshot(Vec::new(), started).await;
        assert_eq!(ids(&applied.current), vec![9]);
    }

    #[tokio::test(start_paused = true)]
    async fn later_snapshot_resurrects_a_removed_key() {
        let reconciler = CollectionReconciler::new(None);
        reconciler.upsert(row(3, 1)).await;
        reconciler.remove("3", None).await;
        tokio::time::advance(Duration::from_millis(10)).await;

        let started = Instant::now();
        let applied = reconciler.apply_snapshot(vec![row(3, 1)], started).await;
        assert_eq!(ids(&applied.current), vec![3]);
    }

    #[tokio::test]
    async fn tombstones_are_bounded() {
        let reconciler: CollectionReconciler<Row> = CollectionReconciler::new(None);
        for id in 0..(TOMBSTONE_CAPACITY as u32 + 10) {
            reconciler.remove(&id.to_string(), Some(1)).await;
        }
        let state = reconciler.state.read().await;
        assert_eq!(state.tombstones.len(), TOMBSTONE_CAPACITY);
        assert_eq!(state.tombstone_order.len(), TOMBSTONE_CAPACITY);
    }
}
