//! Post-commit hooks and the reporting cache.
//!
//! The reconciler calls [`ImportObserver::events_committed`] after every
//! chunk that stored at least one new event. [`StatsCacheVersion`] bumps a
//! persisted counter there; [`StatsCache`] folds that counter into every
//! key, so a bump invalidates all cached aggregates at once.

pub mod stats;
pub mod version;

pub use stats::StatsCache;
pub use version::{StatsCacheVersion, StatsInvalidated};

/// Hook invoked after a chunk of new print events has been committed.
pub trait ImportObserver: Send + Sync {
    fn events_committed(&self, created: u64);
}

/// No-op observer for unit tests and callers without a cache.
pub struct NoopObserver;

impl ImportObserver for NoopObserver {
    fn events_committed(&self, _created: u64) {}
}
