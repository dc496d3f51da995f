//! # bot-console
//!
//! Operator console for a remote chat/music bot. The console never calls
//! the bot: it reads worker telemetry from a shared durable store and
//! issues commands by appending rows to a queue table the worker drains.
//!
//! Push notifications from the store are treated as lossy. Every view is
//! also polled on a fixed interval, and both channels feed reconcilers that
//! keep the highest-version row per key, so views converge and never
//! regress.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── ConsoleService (service/)
//!     │     ├── CommandDispatcher, AnalyticsService, PlaylistService
//!     │     ├── PollScheduler (poll/)   ── fetch ──┐
//!     │     └── push pumps (feed/)      ── event ──┤
//!     │                                            ▼
//!     ├── Reconcilers (reconcile/) ──► EventBus (domain/)
//!     │
//!     ├── TelemetryStore (store/) ── PostgreSQL │ in-memory
//!     └── KoyebClient (control_plane/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod control_plane;
pub mod domain;
pub mod error;
pub mod feed;
pub mod poll;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod ws;
