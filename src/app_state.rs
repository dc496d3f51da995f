//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::ConsoleService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Console service owning every reconciled view.
    pub console: Arc<ConsoleService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wraps a console, sharing its event bus.
    #[must_use]
    pub fn new(console: Arc<ConsoleService>) -> Self {
        let event_bus = console.event_bus().clone();
        Self { console, event_bus }
    }
}
