//! One observed resource: its poll job plus its push pump.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::domain::Resource;
use crate::feed::{ChangeEvent, EventMask};
use crate::poll::PollScheduler;
use crate::store::{Table, TelemetryStore};

/// Pause before resubscribing after a change stream ends.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Handle on a running observation.
///
/// [`Observation::cancel`] stops both the poll job and the push pump and
/// waits for them, so nothing touches the view afterwards.
#[derive(Debug)]
pub struct Observation {
    resource: Resource,
    scheduler: Arc<PollScheduler>,
    pump: Option<JoinHandle<()>>,
}

impl Observation {
    /// Wraps an already scheduled poll job and an optional pump.
    #[must_use]
    pub fn new(resource: Resource, scheduler: Arc<PollScheduler>, pump: Option<JoinHandle<()>>) -> Self {
        Self {
            resource,
            scheduler,
            pump,
        }
    }

    /// Observed resource.
    #[must_use]
    pub const fn resource(&self) -> Resource {
        self.resource
    }

    /// Stops polling and push handling.
    pub async fn cancel(mut self) {
        self.scheduler.cancel(self.resource).await;
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
        tracing::debug!(resource = %self.resource, "observation cancelled");
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Spawns a task that feeds every change on `table` to `apply`.
///
/// When the stream ends or cannot be opened, the task waits
/// [`RESUBSCRIBE_DELAY`] and subscribes again; polling covers the gap.
pub fn spawn_pump<F, Fut>(store: TelemetryStore, table: Table, mask: EventMask, apply: F) -> JoinHandle<()>
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            match store.subscribe(table, mask).await {
                Ok(mut subscription) => {
                    while let Some(event) = subscription.next().await {
                        apply(event).await;
                    }
                    tracing::warn!(table = table.name(), "change stream ended, resubscribing");
                }
                Err(err) => {
                    tracing::warn!(table = table.name(), error = %err, "subscribe failed, relying on polling");
                }
            }
            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
        }
    })
}
