//! User rows and the per-user version counter.

use crate::error::ServerError;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
}

/// Insert a user. A taken username is `AlreadyExists`.
pub fn insert(
    conn: &Connection,
    username: &str,
    salt: &[u8],
    verifier: &[u8],
) -> Result<i64, ServerError> {
    let result = conn.execute(
        "INSERT INTO users (username, salt, verifier, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, salt, verifier, Utc::now().timestamp()],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(ServerError::AlreadyExists(format!("user {}", username)))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<UserRecord>, ServerError> {
    let user = conn
        .query_row(
            "SELECT id, username, salt, verifier FROM users WHERE username = ?1",
            [username],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    salt: row.get(2)?,
                    verifier: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Bump the user's version counter and return the new value.
///
/// Run inside the transaction that writes the versioned row so a rollback
/// also undoes the bump.
pub fn next_version(conn: &Connection, user_id: i64) -> Result<i64, ServerError> {
    conn.query_row(
        "UPDATE users SET version = version + 1 WHERE id = ?1 RETURNING version",
        [user_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| ServerError::NotFound(format!("user {}", user_id)))
}

pub fn current_version(conn: &Connection, user_id: i64) -> Result<i64, ServerError> {
    conn.query_row("SELECT version FROM users WHERE id = ?1", [user_id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| ServerError::NotFound(format!("user {}", user_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ServerStorage;

    #[test]
    fn test_duplicate_username() {
        let storage = ServerStorage::in_memory().unwrap();
        let conn = storage.conn().unwrap();

        insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();
        let err = insert(&conn, "alice", &[3; 16], &[4; 32]).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyExists(_)));

        let user = find_by_username(&conn, "alice").unwrap().unwrap();
        assert_eq!(user.salt, vec![1; 16]);
        assert!(find_by_username(&conn, "bob").unwrap().is_none());
    }

    #[test]
    fn test_versions_are_per_user() {
        let storage = ServerStorage::in_memory().unwrap();
        let conn = storage.conn().unwrap();
        let alice = insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();
        let bob = insert(&conn, "bob", &[1; 16], &[2; 32]).unwrap();

        assert_eq!(next_version(&conn, alice).unwrap(), 1);
        assert_eq!(next_version(&conn, alice).unwrap(), 2);
        assert_eq!(next_version(&conn, bob).unwrap(), 1);
        assert_eq!(current_version(&conn, alice).unwrap(), 2);

        assert!(matches!(
            next_version(&conn, 999),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn test_rolled_back_bump_is_undone() {
        let storage = ServerStorage::in_memory().unwrap();
        let mut conn = storage.conn().unwrap();
        let alice = insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();

        {
            let tx = conn.transaction().unwrap();
            next_version(&tx, alice).unwrap();
            // dropped without commit
        }
        assert_eq!(current_version(&conn, alice).unwrap(), 0);
    }
}
