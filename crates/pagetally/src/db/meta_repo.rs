//! Meta repository: small integer counters in `cache_meta`.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

/// Key of the reporting cache version counter.
pub const STATS_CACHE_VERSION: &str = "stats_cache_version";

/// Reads a counter, `None` when the key has never been written.
pub fn get(conn: &Connection, key: &str) -> Result<Option<i64>, DatabaseError> {
    let value = conn
        .query_row(
            "SELECT value FROM cache_meta WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Atomically increments a counter (starting from 1 when absent) and
/// returns the new value.
pub fn increment(conn: &Connection, key: &str) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO cache_meta (key, value) VALUES (?1, 2)
         ON CONFLICT(key) DO UPDATE SET value = value + 1",
        params![key],
    )?;
    let value: i64 = conn.query_row(
        "SELECT value FROM cache_meta WHERE key = ?1",
        params![key],
        |r| r.get(0),
    )?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_stats_cache_version_is_seeded() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert_eq!(get(conn, STATS_CACHE_VERSION)?, Some(1));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_increment() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert_eq!(increment(conn, STATS_CACHE_VERSION)?, 2);
            assert_eq!(increment(conn, STATS_CACHE_VERSION)?, 3);
            assert_eq!(get(conn, STATS_CACHE_VERSION)?, Some(3));

            assert_eq!(get(conn, "other")?, None);
            assert_eq!(increment(conn, "other")?, 2);
            Ok(())
        })
        .unwrap();
    }
}
