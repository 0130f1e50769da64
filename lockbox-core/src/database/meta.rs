//! Key-value metadata: cached offline credentials and the sync checkpoint.

use crate::{DatabaseError, Result};
use rusqlite::{params, Connection, OptionalExtension};

const KEY_USERNAME: &str = "username";
const KEY_SALT: &str = "salt";
const KEY_VERIFIER: &str = "verifier";
const KEY_CHECKPOINT: &str = "sync_checkpoint";

/// Credentials remembered after a successful online login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredentials {
    pub username: String,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()
        .map_err(DatabaseError::Sqlite)?;
    Ok(value)
}

pub fn set(conn: &Connection, key: &str, value: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .map_err(DatabaseError::Sqlite)?;
    Ok(())
}

pub fn delete(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM meta WHERE key = ?1", params![key])
        .map_err(DatabaseError::Sqlite)?;
    Ok(())
}

/// Load the cached credential triple; `None` unless all three are present.
pub fn load_credentials(conn: &Connection) -> Result<Option<CachedCredentials>> {
    let username = match get(conn, KEY_USERNAME)? {
        Some(bytes) => String::from_utf8(bytes)
            .map_err(|e| DatabaseError::Serialization(format!("Invalid username: {}", e)))?,
        None => return Ok(None),
    };
    let (Some(salt), Some(verifier)) = (get(conn, KEY_SALT)?, get(conn, KEY_VERIFIER)?) else {
        return Ok(None);
    };

    Ok(Some(CachedCredentials {
        username,
        salt,
        verifier,
    }))
}

pub fn save_credentials(conn: &Connection, creds: &CachedCredentials) -> Result<()> {
    set(conn, KEY_USERNAME, creds.username.as_bytes())?;
    set(conn, KEY_SALT, &creds.salt)?;
    set(conn, KEY_VERIFIER, &creds.verifier)?;
    Ok(())
}

pub fn clear_credentials(conn: &Connection) -> Result<()> {
    delete(conn, KEY_USERNAME)?;
    delete(conn, KEY_SALT)?;
    delete(conn, KEY_VERIFIER)?;
    Ok(())
}

/// Highest server version already incorporated; 0 before the first sync
pub fn load_checkpoint(conn: &Connection) -> Result<i64> {
    match get(conn, KEY_CHECKPOINT)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                DatabaseError::Serialization("Corrupt sync checkpoint".to_string())
            })?;
            Ok(i64::from_be_bytes(arr))
        }
        None => Ok(0),
    }
}

pub fn save_checkpoint(conn: &Connection, version: i64) -> Result<()> {
    set(conn, KEY_CHECKPOINT, &version.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize_schema().unwrap();
        db
    }

    #[test]
    fn test_credentials_roundtrip_and_clear() {
        let db = db();
        assert!(load_credentials(db.conn()).unwrap().is_none());

        let creds = CachedCredentials {
            username: "alice".to_string(),
            salt: vec![1; 16],
            verifier: vec![2; 32],
        };
        save_credentials(db.conn(), &creds).unwrap();
        assert_eq!(load_credentials(db.conn()).unwrap(), Some(creds));

        clear_credentials(db.conn()).unwrap();
        assert!(load_credentials(db.conn()).unwrap().is_none());
    }

    #[test]
    fn test_partial_credentials_treated_as_absent() {
        let db = db();
        set(db.conn(), KEY_USERNAME, b"alice").unwrap();
        assert!(load_credentials(db.conn()).unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_defaults_to_zero() {
        let db = db();
        assert_eq!(load_checkpoint(db.conn()).unwrap(), 0);
        save_checkpoint(db.conn(), 42).unwrap();
        assert_eq!(load_checkpoint(db.conn()).unwrap(), 42);
        save_checkpoint(db.conn(), 43).unwrap();
        assert_eq!(load_checkpoint(db.conn()).unwrap(), 43);
    }
}
