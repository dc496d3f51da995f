//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams [`crate::domain::ViewUpdate`]s for
//! the resources a client subscribed to, starting with the current snapshot
//! of each.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
