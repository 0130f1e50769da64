//! Queries over the `files` table.

use crate::database::models::{LocalFile, UploadStatus};
use crate::{DatabaseError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use uuid::Uuid;

const COLUMNS: &str =
    "entry_id, encrypted_key, key_nonce, storage_key, local_path, upload_status, version, deleted";

struct RawFile {
    entry_id: String,
    local_path: Option<String>,
    upload_status: String,
    file: LocalFile,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawFile> {
    Ok(RawFile {
        entry_id: row.get(0)?,
        local_path: row.get(4)?,
        upload_status: row.get(5)?,
        file: LocalFile {
            entry_id: Uuid::nil(),
            encrypted_key: row.get(1)?,
            key_nonce: row.get(2)?,
            storage_key: row.get(3)?,
            local_path: None,
            upload_status: UploadStatus::Pending,
            version: row.get(6)?,
            deleted: row.get(7)?,
        },
    })
}

fn finish(raw: RawFile) -> Result<LocalFile> {
    let mut file = raw.file;
    file.entry_id = Uuid::parse_str(&raw.entry_id)
        .map_err(|e| DatabaseError::Other(format!("Invalid entry id {}: {}", raw.entry_id, e)))?;
    file.local_path = raw.local_path.map(PathBuf::from);
    file.upload_status = raw.upload_status.parse()?;
    Ok(file)
}

fn path_to_str(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

/// Record a freshly staged file
pub fn insert(conn: &Connection, file: &LocalFile) -> Result<()> {
    conn.execute(
        "INSERT INTO files (entry_id, encrypted_key, key_nonce, storage_key, local_path, upload_status, version, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            file.entry_id.to_string(),
            file.encrypted_key,
            file.key_nonce,
            file.storage_key,
            path_to_str(&file.local_path),
            file.upload_status.as_str(),
            file.version,
            file.deleted,
        ],
    )
    .map_err(DatabaseError::Sqlite)?;
    Ok(())
}

/// Apply a server copy. The local staging path is never overwritten.
pub fn upsert_from_server(conn: &Connection, file: &LocalFile) -> Result<()> {
    conn.execute(
        "INSERT INTO files (entry_id, encrypted_key, key_nonce, storage_key, upload_status, version, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(entry_id) DO UPDATE SET
            encrypted_key = excluded.encrypted_key,
            key_nonce = excluded.key_nonce,
            storage_key = excluded.storage_key,
            upload_status = excluded.upload_status,
            version = excluded.version,
            deleted = excluded.deleted",
        params![
            file.entry_id.to_string(),
            file.encrypted_key,
            file.key_nonce,
            file.storage_key,
            file.upload_status.as_str(),
            file.version,
            file.deleted,
        ],
    )
    .map_err(DatabaseError::Sqlite)?;
    Ok(())
}

pub fn get(conn: &Connection, entry_id: Uuid) -> Result<Option<LocalFile>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM files WHERE entry_id = ?1", COLUMNS),
            params![entry_id.to_string()],
            from_row,
        )
        .optional()
        .map_err(DatabaseError::Sqlite)?;
    raw.map(finish).transpose()
}

/// Files whose staged ciphertext has not been uploaded yet
pub fn list_pending(conn: &Connection) -> Result<Vec<LocalFile>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM files
             WHERE upload_status = 'pending' AND local_path IS NOT NULL AND deleted = 0
             ORDER BY rowid",
            COLUMNS
        ))
        .map_err(DatabaseError::Sqlite)?;
    let rows = stmt.query_map([], from_row).map_err(DatabaseError::Sqlite)?;

    let mut files = Vec::new();
    for row in rows {
        files.push(finish(row.map_err(DatabaseError::Sqlite)?)?);
    }
    Ok(files)
}

pub fn count_pending(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM files
             WHERE upload_status = 'pending' AND local_path IS NOT NULL AND deleted = 0",
            [],
            |row| row.get(0),
        )
        .map_err(DatabaseError::Sqlite)?;
    Ok(count as u64)
}

/// Record a finished upload: completed status, final storage key, no staging path.
pub fn mark_completed(conn: &Connection, entry_id: Uuid, storage_key: &str, version: i64) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE files SET upload_status = 'completed', storage_key = ?2,
                    local_path = NULL, version = MAX(version, ?3)
             WHERE entry_id = ?1",
            params![entry_id.to_string(), storage_key, version],
        )
        .map_err(DatabaseError::Sqlite)?;
    if rows != 1 {
        return Err(DatabaseError::Other(format!("No local file for entry {}", entry_id)).into());
    }
    Ok(())
}

/// Forget the staging copy of a file without touching its upload status.
///
/// The row drops out of [`list_pending`] until the file is staged again.
pub fn detach_staging(conn: &Connection, entry_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE files SET local_path = NULL WHERE entry_id = ?1",
        params![entry_id.to_string()],
    )
    .map_err(DatabaseError::Sqlite)?;
    Ok(())
}

/// Tombstone a file and detach its staging copy.
///
/// Returns the staging path that was detached so the caller can remove it.
pub fn mark_deleted(conn: &Connection, entry_id: Uuid) -> Result<Option<PathBuf>> {
    let previous = get(conn, entry_id)?;
    conn.execute(
        "UPDATE files SET deleted = 1, local_path = NULL WHERE entry_id = ?1",
        params![entry_id.to_string()],
    )
    .map_err(DatabaseError::Sqlite)?;
    Ok(previous.and_then(|f| f.local_path))
}
