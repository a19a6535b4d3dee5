//! User repository: the `users` table.

use rusqlite::{params, Connection, Row};

use super::{now_timestamp, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub fio: String,
    pub department_id: Option<i64>,
    pub is_active: bool,
    pub created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            fio: row.get("fio")?,
            department_id: row.get("department_id")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Finds a user by username, ignoring case.
pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>, DatabaseError> {
    let mut stmt = conn.prepare_cached("SELECT * FROM users WHERE username = ?1")?;
    let mut rows = stmt.query_map(params![username], UserRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Inserts a user unless the username (any case) is taken. Returns whether
/// this call created the row.
pub fn insert_if_absent(
    conn: &Connection,
    username: &str,
    fio: &str,
    department_id: Option<i64>,
    is_active: bool,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO users (username, fio, department_id, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(username) DO NOTHING",
        params![username, fio, department_id, is_active, now_timestamp()],
    )?;
    Ok(changed == 1)
}

/// Overwrites the profile fields of an existing user.
pub fn update_profile(
    conn: &Connection,
    username: &str,
    fio: &str,
    department_id: Option<i64>,
    is_active: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET fio = ?2, department_id = ?3, is_active = ?4 WHERE username = ?1",
        params![username, fio, department_id, is_active],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{catalog_repo, Database};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_find_ignores_case() {
        let db = test_db();
        db.with_conn(|conn| {
            assert!(insert_if_absent(conn, "alice", "Alice A", None, true)?);
            let user = find_by_username(conn, "ALICE")?.unwrap();
            assert_eq!(user.username, "alice");
            assert_eq!(user.fio, "Alice A");
            assert!(user.is_active);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert_existing_is_noop() {
        let db = test_db();
        db.with_conn(|conn| {
            assert!(insert_if_absent(conn, "bob", "Bob", None, true)?);
            assert!(!insert_if_absent(conn, "BOB", "Other", None, false)?);
            let user = find_by_username(conn, "bob")?.unwrap();
            assert_eq!(user.fio, "Bob");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_profile() {
        let db = test_db();
        db.with_conn(|conn| {
            catalog_repo::insert_department(conn, "HR", "HR")?;
            let hr = catalog_repo::find_department(conn, "HR")?.unwrap();
            insert_if_absent(conn, "carol", "carol", None, false)?;

            update_profile(conn, "CAROL", "Carol C", Some(hr.id), true)?;

            let user = find_by_username(conn, "carol")?.unwrap();
            assert_eq!(user.fio, "Carol C");
            assert_eq!(user.department_id, Some(hr.id));
            assert!(user.is_active);
            Ok(())
        })
        .unwrap();
    }
}
