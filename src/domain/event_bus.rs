//! Broadcast channel for view updates.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every accepted
//! reconciler change publishes a [`ViewUpdate`] through the bus, and all
//! WebSocket connections subscribe to receive filtered updates.

use tokio::sync::broadcast;

use super::ViewUpdate;

/// Broadcast bus for [`ViewUpdate`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest updates are dropped for lagging
/// receivers; those receivers catch up from the next update, which always
/// carries the full current view.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ViewUpdate>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an update to all subscribers.
    ///
    /// Returns the number of receivers that received it. Without active
    /// receivers the update is silently dropped.
    pub fn publish(&self, update: ViewUpdate) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    /// Creates a new receiver for all future updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Resource, UpdateSource};

    fn make_update(resource: Resource) -> ViewUpdate {
        ViewUpdate::whole(resource, UpdateSource::Poll, serde_json::json!({}))
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(make_update(Resource::SystemStats)), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_update() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(make_update(Resource::BotLogs)), 2);

        let Ok(a) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(b) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(a.resource, Resource::BotLogs);
        assert_eq!(b.resource, Resource::BotLogs);
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }
}
