//! Latest-row-wins views, one slot per key.

use std::collections::HashMap;

use tokio::sync::{RwLock, watch};

use super::{Applied, Versioned};

/// Keeps, per key, the highest-version row delivered by either channel.
///
/// Used for the current stats sample (single key) and for command entries
/// (keyed by command id).
#[derive(Debug)]
pub struct LatestReconciler<T: Versioned> {
    slots: RwLock<HashMap<String, watch::Sender<Option<T>>>>,
}

impl<T: Versioned> Default for LatestReconciler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Versioned> LatestReconciler<T> {
    /// Creates an empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &str) -> watch::Sender<Option<T>> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }

    /// Offers `candidate` for `key`; it replaces the current row only when
    /// its version is strictly higher.
    pub async fn apply(&self, key: &str, candidate: T) -> Applied<Option<T>> {
        let slot = self.slot(key).await;
        let changed = slot.send_if_modified(|current| match current {
            Some(shown) if candidate.version() <= shown.version() => false,
            _ => {
                *current = Some(candidate);
                true
            }
        });
        if changed {
            tracing::trace!(key, "latest view advanced");
        }
        Applied {
            current: slot.borrow().clone(),
            changed,
        }
    }

    /// Current row for `key`.
    pub async fn current(&self, key: &str) -> Option<T> {
        self.slots
            .read()
            .await
            .get(key)
            .and_then(|slot| slot.borrow().clone())
    }

    /// Every current row, in no particular order.
    pub async fn values(&self) -> Vec<T> {
        self.slots
            .read()
            .await
            .values()
            .filter_map(|slot| slot.borrow().clone())
            .collect()
    }

    /// Bounds the number of slots.
    ///
    /// Slots nobody watches and whose row `pinned` does not select are
    /// ranked by `recency`; all but the `capacity` most recent are dropped,
    /// as are unwatched empty slots. Returns how many slots were dropped.
    pub async fn retain_recent<K, P, R>(&self, capacity: usize, pinned: P, recency: R) -> usize
    where
        K: Ord,
        P: Fn(&T) -> bool,
        R: Fn(&T) -> K,
    {
        let mut slots = self.slots.write().await;
        let mut ranked = Vec::new();
        let mut evicted = Vec::new();
        for (key, slot) in slots.iter() {
            if slot.receiver_count() > 0 {
                continue;
            }
            match slot.borrow().as_ref() {
                None => evicted.push(key.clone()),
                Some(row) if pinned(row) => {}
                Some(row) => ranked.push((recency(row), key.clone())),
            }
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        evicted.extend(ranked.into_iter().skip(capacity).map(|(_, key)| key));
        for key in &evicted {
            slots.remove(key);
        }
        if !evicted.is_empty() {
            tracing::trace!(evicted = evicted.len(), "latest view trimmed");
        }
        evicted.len()
    }

    /// Receiver that observes `key`, created empty if nothing arrived yet.
    pub async fn watch(&self, key: &str) -> watch::Receiver<Option<T>> {
        self.slot(key).await.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: &'static str,
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

    fn row(version: u32) -> Row {
        Row { id: "a", version }
    }

    #[tokio::test]
    async fn keeps_the_highest_version_from_any_order() {
        let reconciler = LatestReconciler::new();
        assert!(reconciler.apply("k", row(2)).await.changed);
        let stale = reconciler.apply("k", row(1)).await;
        assert!(!stale.changed);
        assert_eq!(stale.current, Some(row(2)));
        assert!(reconciler.apply("k", row(3)).await.changed);
        assert_eq!(reconciler.current("k").await, Some(row(3)));
    }

    #[tokio::test]
    async fn redelivery_is_a_no_op() {
        let reconciler = LatestReconciler::new();
        let first = reconciler.apply("k", row(5)).await;
        let again = reconciler.apply("k", row(5)).await;
        assert!(first.changed);
        assert!(!again.changed);
        assert_eq!(first.current, again.current);
    }

    #[tokio::test]
    async fn watchers_see_only_visible_changes() {
        let reconciler = LatestReconciler::new();
        let mut rx = reconciler.watch("k").await;
        assert_eq!(*rx.borrow_and_update(), None);

        reconciler.apply("k", row(2)).await;
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(*rx.borrow_and_update(), Some(row(2)));

        reconciler.apply("k", row(1)).await;
        assert!(!rx.has_changed().unwrap_or(true));
    }

    #[tokio::test]
    async fn retain_recent_keeps_pinned_and_watched_slots() {
        let reconciler = LatestReconciler::new();
        for (i, id) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            let version = u32::try_from(i).unwrap_or_default();
            reconciler.apply(id, Row { id, version }).await;
        }
        let watched = reconciler.watch("a").await;

        // "b" is pinned; "a" is watched; of c, d, e only the newest survives.
        let evicted = reconciler.retain_recent(1, |r| r.id == "b", |r| r.version).await;
        assert_eq!(evicted, 2);
        let mut left: Vec<&str> = reconciler.values().await.iter().map(|r| r.id).collect();
        left.sort_unstable();
        assert_eq!(left, vec!["a", "b", "e"]);

        drop(watched);
        let _ = reconciler.watch("unused").await;
        assert_eq!(reconciler.retain_recent(1, |_| false, |r| r.version).await, 3);
        assert_eq!(reconciler.values().await.len(), 1);
    }

    #[tokio::test]
    async fn values_lists_every_key() {
        let reconciler = LatestReconciler::new();
        reconciler.apply("a", row(1)).await;
        reconciler.apply("b", Row { id: "b", version: 1 }).await;
        let _ = reconciler.watch("empty").await;
        assert_eq!(reconciler.values().await.len(), 2);
    }
}
