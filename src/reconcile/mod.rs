//! Merging push- and poll-driven updates into one view per resource.
//!
//! Both channels feed the same reconciler; the row version decides. A
//! candidate that is not strictly newer than what is shown is ignored, which
//! makes re-delivery idempotent and the view monotonic regardless of which
//! channel delivered first.

pub mod collection;
pub mod latest;
pub mod snapshot;

use std::fmt;

pub use collection::CollectionReconciler;
pub use latest::LatestReconciler;
pub use snapshot::SnapshotView;

/// A row that can be reconciled.
pub trait Versioned: Clone + fmt::Debug + Send + Sync + 'static {
    /// Totally ordered version; higher wins.
    type Version: Ord + Clone + fmt::Debug + Send + Sync;

    /// Unique key of the row within its resource.
    fn row_key(&self) -> String;

    /// Version of this copy of the row.
    fn version(&self) -> Self::Version;
}

/// Result of applying a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<V> {
    /// View after the candidate was considered.
    pub current: V,
    /// Whether the view visibly changed.
    pub changed: bool,
}
