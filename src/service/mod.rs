//! Service layer: business logic orchestration.
//!
//! [`ConsoleService`] owns the reconciled views and keeps them fresh from
//! polls and pushes; the other services are the pieces it composes.

pub mod aggregator;
pub mod analytics;
pub mod console;
pub mod diagnostics;
pub mod dispatcher;
pub mod observation;
pub mod playlists;

pub use aggregator::{DayBucket, Ranked, UsageTotals};
pub use analytics::{AnalyticsService, AnalyticsSummary};
pub use console::{ConsoleService, ConsoleViews};
pub use diagnostics::{Diagnostics, DiagnosticsService, SettingsPresence, TableCheck};
pub use dispatcher::{CommandDispatcher, CommandHandle};
pub use observation::Observation;
pub use playlists::{PlaylistService, TrackDraft};
