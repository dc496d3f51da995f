//! Change feed over the in-memory store's broadcast channel.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{ChangeEvent, ChangeFeed, EventMask, Subscription};
use crate::error::StoreError;
use crate::store::Table;

/// Feed fed by [`crate::store::MemoryStore`] writes.
#[derive(Debug, Clone)]
pub struct MemoryChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    buffer: usize,
}

impl MemoryChangeFeed {
    /// Creates a feed over `sender`; each subscription buffers up to
    /// `buffer` undelivered events.
    #[must_use]
    pub fn new(sender: broadcast::Sender<ChangeEvent>, buffer: usize) -> Self {
        Self { sender, buffer }
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn subscribe(&self, table: Table, mask: EventMask) -> Result<Subscription, StoreError> {
        // Subscribe before spawning so writes after this call are observed.
        let mut rx = self.sender.subscribe();
        Ok(Subscription::spawn(table, mask, self.buffer, move |sink| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !sink.deliver(event) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(table = table.name(), skipped, "change feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
