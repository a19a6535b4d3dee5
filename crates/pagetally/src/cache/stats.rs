//! Version-keyed cache of reporting aggregates.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::StatsCacheVersion;
use crate::db::stats_repo::{self, Dashboard, DepartmentTotal, UsageTreeRow, UserTotal};
use crate::db::{Database, DatabaseError};

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CAPACITY: u64 = 1_000;

#[derive(Debug, Clone)]
enum Cached {
    Dashboard(Arc<Dashboard>),
    Departments(Arc<Vec<DepartmentTotal>>),
    Users(Arc<Vec<UserTotal>>),
    Tree(Arc<Vec<UsageTreeRow>>),
}

/// Aggregates cached under `v{version}:{report}:{from}:{to}` keys.
///
/// Entries from an older version are never read again and age out with
/// the TTL.
#[derive(Clone)]
pub struct StatsCache {
    db: Database,
    version: StatsCacheVersion,
    cache: Cache<String, Cached>,
}

impl StatsCache {
    pub fn new(db: Database, version: StatsCacheVersion) -> Self {
        Self::with_ttl(db, version, DEFAULT_TTL)
    }

    pub fn with_ttl(db: Database, version: StatsCacheVersion, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(DEFAULT_CAPACITY)
            .build();
        Self { db, version, cache }
    }

    /// Cache key for a report over a time range at the current version.
    pub fn key(&self, report: &str, from: &str, to: &str) -> Result<String, DatabaseError> {
        Ok(format!("v{}:{}:{}:{}", self.version.current()?, report, from, to))
    }

    pub fn dashboard(&self, since: &str) -> Result<Arc<Dashboard>, DatabaseError> {
        let key = self.key("dashboard", since, "")?;
        if let Some(Cached::Dashboard(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }
        let value = Arc::new(stats_repo::dashboard(&self.db, since)?);
        self.cache.insert(key, Cached::Dashboard(Arc::clone(&value)));
        Ok(value)
    }

    pub fn department_totals(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Arc<Vec<DepartmentTotal>>, DatabaseError> {
        let key = self.key("departments", from, to)?;
        if let Some(Cached::Departments(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }
        let value = Arc::new(stats_repo::department_totals(&self.db, from, to)?);
        self.cache.insert(key, Cached::Departments(Arc::clone(&value)));
        Ok(value)
    }

    pub fn top_users(
        &self,
        from: &str,
        to: &str,
        limit: u32,
    ) -> Result<Arc<Vec<UserTotal>>, DatabaseError> {
        let key = self.key(&format!("top_users_{}", limit), from, to)?;
        if let Some(Cached::Users(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }
        let value = Arc::new(stats_repo::top_users(&self.db, from, to, limit)?);
        self.cache.insert(key, Cached::Users(Arc::clone(&value)));
        Ok(value)
    }

    pub fn usage_tree(&self, from: &str, to: &str) -> Result<Arc<Vec<UsageTreeRow>>, DatabaseError> {
        let key = self.key("usage_tree", from, to)?;
        if let Some(Cached::Tree(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }
        let value = Arc::new(stats_repo::usage_tree(&self.db, from, to)?);
        self.cache.insert(key, Cached::Tree(Arc::clone(&value)));
        Ok(value)
    }
}
