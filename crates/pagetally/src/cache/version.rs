//! Persisted stats cache version counter.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use super::ImportObserver;
use crate::db::{meta_repo, Database, DatabaseError};

const CHANNEL_CAPACITY: usize = 64;

/// Broadcast after the version has been bumped.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsInvalidated {
    pub version: i64,
    pub created: u64,
}

/// The `stats_cache_version` counter in `cache_meta`.
///
/// The counter lives in the database so every process writing to the same
/// file invalidates the same caches.
#[derive(Clone)]
pub struct StatsCacheVersion {
    db: Database,
    sender: Arc<broadcast::Sender<StatsInvalidated>>,
}

impl StatsCacheVersion {
    pub fn new(db: Database) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            db,
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Result<i64, DatabaseError> {
        self.db
            .with_conn(|conn| Ok(meta_repo::get(conn, meta_repo::STATS_CACHE_VERSION)?.unwrap_or(1)))
    }

    pub fn bump(&self) -> Result<i64, DatabaseError> {
        self.db
            .with_conn(|conn| meta_repo::increment(conn, meta_repo::STATS_CACHE_VERSION))
    }

    /// Subscribe to invalidation notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StatsInvalidated> {
        self.sender.subscribe()
    }
}

impl ImportObserver for StatsCacheVersion {
    fn events_committed(&self, created: u64) {
        match self.bump() {
            Ok(version) => {
                log::debug!("Stats cache version bumped to {} ({} new events)", version, created);
                // No receivers is fine.
                let _ = self.sender.send(StatsInvalidated { version, created });
            }
            Err(e) => log::warn!("Failed to bump stats cache version: {}", e),
        }
    }
}
