//! Database schema and connection management.

use crate::{DatabaseError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Current schema version, recorded in `PRAGMA user_version`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Local cache connection and schema manager
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(DatabaseError::Sqlite)?;

        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
            .map_err(DatabaseError::Sqlite)?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database for testing
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Sqlite)?;

        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(DatabaseError::Sqlite)?;

        Ok(Self { conn })
    }

    /// Create all tables if missing and check the schema version
    pub fn initialize_schema(&self) -> Result<()> {
        self.create_meta_table()?;
        self.create_entries_table()?;
        self.create_files_table()?;
        self.create_indexes()?;
        self.validate_schema_version()
    }

    fn create_meta_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
                [],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    fn create_entries_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                overview BLOB NOT NULL,
                overview_nonce BLOB NOT NULL,
                details BLOB NOT NULL,
                details_nonce BLOB NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                pending INTEGER NOT NULL DEFAULT 1
            )",
                [],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    fn create_files_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS files (
                entry_id TEXT PRIMARY KEY,
                encrypted_key BLOB NOT NULL,
                key_nonce BLOB NOT NULL,
                storage_key TEXT,
                local_path TEXT,
                upload_status TEXT NOT NULL DEFAULT 'pending',
                version INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
                [],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    fn create_indexes(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_entries_pending ON entries(pending);
                 CREATE INDEX IF NOT EXISTS idx_files_status ON files(upload_status);",
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    /// Stamp a fresh database with the current version; reject newer ones.
    pub fn validate_schema_version(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(DatabaseError::Sqlite)?;

        match version {
            0 => {
                self.conn
                    .pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
                    .map_err(DatabaseError::Sqlite)?;
                Ok(())
            }
            v if v == CURRENT_SCHEMA_VERSION => Ok(()),
            v => Err(DatabaseError::Other(format!(
                "Unsupported schema version {} (expected {})",
                v, CURRENT_SCHEMA_VERSION
            ))
            .into()),
        }
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, needed to open a transaction
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
