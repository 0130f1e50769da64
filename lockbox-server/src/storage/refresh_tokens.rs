//! Persisted refresh tokens, keyed by the SHA-256 of the token.

use crate::error::ServerError;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert(conn: &Connection, token_hash: &str, user_id: i64, expires_at: i64) -> Result<(), ServerError> {
    conn.execute(
        "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token_hash, user_id, expires_at],
    )?;
    Ok(())
}

/// Remove a token and return `(user_id, expires_at)` if it existed.
pub fn take(conn: &Connection, token_hash: &str) -> Result<Option<(i64, i64)>, ServerError> {
    let row = conn
        .query_row(
            "DELETE FROM refresh_tokens WHERE token_hash = ?1 RETURNING user_id, expires_at",
            [token_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

pub fn delete_expired(conn: &Connection, now: i64) -> Result<usize, ServerError> {
    Ok(conn.execute("DELETE FROM refresh_tokens WHERE expires_at <= ?1", [now])?)
}

pub fn count_for_user(conn: &Connection, user_id: i64) -> Result<i64, ServerError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{users, ServerStorage};

    #[test]
    fn test_take_is_single_use() {
        let storage = ServerStorage::in_memory().unwrap();
        let conn = storage.conn().unwrap();
        let alice = users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();

        insert(&conn, "h1", alice, 100).unwrap();
        assert_eq!(take(&conn, "h1").unwrap(), Some((alice, 100)));
        assert_eq!(take(&conn, "h1").unwrap(), None);
    }

    #[test]
    fn test_delete_expired() {
        let storage = ServerStorage::in_memory().unwrap();
        let conn = storage.conn().unwrap();
        let alice = users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();

        insert(&conn, "old", alice, 10).unwrap();
        insert(&conn, "new", alice, 1_000).unwrap();

        assert_eq!(delete_expired(&conn, 500).unwrap(), 1);
        assert_eq!(count_for_user(&conn, alice).unwrap(), 1);
    }
}
