//! Single derived values replaced wholesale by each poll.

use tokio::sync::{RwLock, watch};
use tokio::time::Instant;

/// Holds one value (analytics summary, playlist list, infra status).
///
/// A result is accepted only if its fetch started no earlier than the one
/// currently displayed, so a slow fetch cannot overwrite a faster, newer one.
#[derive(Debug)]
pub struct SnapshotView<T> {
    started: RwLock<Option<Instant>>,
    tx: watch::Sender<Option<T>>,
}

impl<T> Default for SnapshotView<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotView<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: RwLock::new(None),
            tx: watch::channel(None).0,
        }
    }

    /// Offers `value` fetched starting at `started_at`. Returns whether the
    /// displayed value changed.
    pub async fn offer(&self, value: T, started_at: Instant) -> bool {
        let mut started = self.started.write().await;
        if started.is_some_and(|shown| started_at < shown) {
            tracing::debug!("discarding result of an older fetch");
            return false;
        }
        *started = Some(started_at);
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&value) {
                false
            } else {
                *current = Some(value);
                true
            }
        })
    }

    /// Current value.
    #[must_use]
    pub fn current(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Receiver over the value.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }
}
