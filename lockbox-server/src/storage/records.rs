//! Entry and file rows.
//!
//! Upserts only ever touch rows owned by the calling user; an id collision
//! with another user's row changes nothing and is reported as a version
//! conflict.

use crate::error::ServerError;
use chrono::Utc;
use lockbox_core::database::UploadStatus;
use lockbox_core::rpc::models::{EntryBlob, FileBlob};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<UploadStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EntryBlob> {
    Ok(EntryBlob {
        id: uuid_column(row, 0)?,
        version: row.get(1)?,
        overview: row.get(2)?,
        overview_nonce: row.get(3)?,
        details: row.get(4)?,
        details_nonce: row.get(5)?,
        deleted: row.get(6)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileBlob> {
    Ok(FileBlob {
        entry_id: uuid_column(row, 0)?,
        version: row.get(1)?,
        encrypted_key: row.get(2)?,
        key_nonce: row.get(3)?,
        storage_key: row.get(4)?,
        upload_status: status_column(row, 5)?,
        deleted: row.get(6)?,
    })
}

/// Entries of `user_id` with a version above `since`, oldest first.
pub fn changed_entries(conn: &Connection, user_id: i64, since: i64) -> Result<Vec<EntryBlob>, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT id, version, overview, overview_nonce, details, details_nonce, deleted
         FROM entries
         WHERE user_id = ?1 AND version > ?2
         ORDER BY version ASC",
    )?;
    let entries = stmt
        .query_map(params![user_id, since], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Files of `user_id` with a version above `since`, oldest first.
pub fn changed_files(conn: &Connection, user_id: i64, since: i64) -> Result<Vec<FileBlob>, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, version, encrypted_key, key_nonce, storage_key, upload_status, deleted
         FROM files
         WHERE user_id = ?1 AND version > ?2
         ORDER BY version ASC",
    )?;
    let files = stmt
        .query_map(params![user_id, since], file_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

pub fn upsert_entry(conn: &Connection, user_id: i64, entry: &EntryBlob) -> Result<(), ServerError> {
    let changed = conn.execute(
        "INSERT INTO entries (id, user_id, version, overview, overview_nonce,
                              details, details_nonce, deleted, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            version = excluded.version,
            overview = excluded.overview,
            overview_nonce = excluded.overview_nonce,
            details = excluded.details,
            details_nonce = excluded.details_nonce,
            deleted = excluded.deleted,
            updated_at = excluded.updated_at
         WHERE entries.user_id = excluded.user_id",
        params![
            entry.id.to_string(),
            user_id,
            entry.version,
            entry.overview,
            entry.overview_nonce,
            entry.details,
            entry.details_nonce,
            entry.deleted,
            Utc::now().timestamp(),
        ],
    )?;

    if changed == 0 {
        return Err(ServerError::VersionConflict(format!("entry {}", entry.id)));
    }
    Ok(())
}

pub fn upsert_file(conn: &Connection, user_id: i64, file: &FileBlob) -> Result<(), ServerError> {
    let changed = conn.execute(
        "INSERT INTO files (entry_id, user_id, version, encrypted_key, key_nonce,
                            storage_key, upload_status, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(entry_id) DO UPDATE SET
            version = excluded.version,
            encrypted_key = excluded.encrypted_key,
            key_nonce = excluded.key_nonce,
            storage_key = excluded.storage_key,
            upload_status = excluded.upload_status,
            deleted = excluded.deleted
         WHERE files.user_id = excluded.user_id",
        params![
            file.entry_id.to_string(),
            user_id,
            file.version,
            file.encrypted_key,
            file.key_nonce,
            file.storage_key,
            file.upload_status.as_str(),
            file.deleted,
        ],
    )?;

    if changed == 0 {
        return Err(ServerError::VersionConflict(format!("file {}", file.entry_id)));
    }
    Ok(())
}

/// Tombstone the file attached to an entry, if the user has one.
pub fn mark_file_deleted(conn: &Connection, user_id: i64, entry_id: Uuid) -> Result<bool, ServerError> {
    let changed = conn.execute(
        "UPDATE files SET deleted = 1 WHERE entry_id = ?1 AND user_id = ?2",
        params![entry_id.to_string(), user_id],
    )?;
    Ok(changed > 0)
}

/// Flip a file to completed at `version`. Exactly one row must match.
pub fn mark_uploaded(conn: &Connection, user_id: i64, entry_id: Uuid, version: i64) -> Result<(), ServerError> {
    let changed = conn.execute(
        "UPDATE files SET upload_status = ?1, version = ?2 WHERE entry_id = ?3 AND user_id = ?4",
        params![UploadStatus::Completed.as_str(), version, entry_id.to_string(), user_id],
    )?;

    if changed != 1 {
        return Err(ServerError::NotFound(format!("file {}", entry_id)));
    }
    Ok(())
}

/// Storage key of a live file owned by the user.
pub fn storage_key(conn: &Connection, user_id: i64, entry_id: Uuid) -> Result<String, ServerError> {
    let key: Option<Option<String>> = conn
        .query_row(
            "SELECT storage_key FROM files WHERE entry_id = ?1 AND user_id = ?2 AND deleted = 0",
            params![entry_id.to_string(), user_id],
            |row| row.get(0),
        )
        .optional()?;

    key.flatten()
        .ok_or_else(|| ServerError::NotFound(format!("file {}", entry_id)))
}

pub fn get_entry(conn: &Connection, user_id: i64, id: Uuid) -> Result<Option<EntryBlob>, ServerError> {
    let entry = conn
        .query_row(
            "SELECT id, version, overview, overview_nonce, details, details_nonce, deleted
             FROM entries WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}
