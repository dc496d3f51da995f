//! The poll scheduler.
//!
//! Polling is the console's correctness backstop: whatever push delivers or
//! loses, every observed resource is re-fetched at its interval, which bounds
//! staleness.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::Resource;
use crate::error::ConsoleError;

/// Owns one repeating fetch job per [`Resource`].
#[derive(Debug, Default)]
pub struct PollScheduler {
    jobs: Mutex<HashMap<Resource, JoinHandle<()>>>,
}

impl PollScheduler {
    /// Creates a scheduler with no jobs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts polling `resource` every `interval`; the first fetch happens
    /// immediately. Errors are logged and the loop keeps going. Scheduling a
    /// resource that already has a job replaces it.
    pub async fn schedule<F, Fut>(&self, resource: Resource, interval: Duration, mut fetch: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ConsoleError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = fetch().await {
                    tracing::warn!(%resource, error = %err, "poll failed, keeping last view");
                }
            }
        });

        let previous = self.jobs.lock().await.insert(resource, handle);
        if let Some(previous) = previous {
            previous.abort();
            let _ = previous.await;
            tracing::debug!(%resource, "replaced poll job");
        }
    }

    /// Stops polling `resource`. No fetch runs after this returns.
    pub async fn cancel(&self, resource: Resource) {
        let handle = self.jobs.lock().await.remove(&resource);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Stops every job.
    pub async fn cancel_all(&self) {
        let handles: Vec<_> = self.jobs.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Whether `resource` currently has a job.
    pub async fn is_scheduled(&self, resource: Resource) -> bool {
        self.jobs.lock().await.contains_key(&resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<Result<(), ConsoleError>> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_periodic() {
        let scheduler = PollScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule(Resource::SystemStats, Duration::from_secs(5), counting(&count))
            .await;

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        scheduler.cancel_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_the_loop() {
        let scheduler = PollScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        scheduler
            .schedule(Resource::BotLogs, Duration::from_secs(1), move || {
                seen.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(ConsoleError::Internal("boom".to_string())))
            })
            .await;

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        scheduler.cancel(Resource::BotLogs).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_fetches() {
        let scheduler = PollScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule(Resource::ActiveSessions, Duration::from_secs(5), counting(&count))
            .await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.cancel(Resource::ActiveSessions).await;
        assert!(!scheduler.is_scheduled(Resource::ActiveSessions).await);

        let before = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_job() {
        let scheduler = PollScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule(Resource::Analytics, Duration::from_secs(30), counting(&first))
            .await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler
            .schedule(Resource::Analytics, Duration::from_secs(30), counting(&second))
            .await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        scheduler.cancel_all().await;
    }
}
