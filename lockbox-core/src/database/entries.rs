//! Queries over the `entries` table.

use crate::database::models::LocalEntry;
use crate::{DatabaseError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const COLUMNS: &str =
    "id, overview, overview_nonce, details, details_nonce, version, deleted, pending";

fn from_row(row: &Row<'_>) -> rusqlite::Result<(String, LocalEntry)> {
    let id: String = row.get(0)?;
    Ok((
        id,
        LocalEntry {
            id: Uuid::nil(),
            overview: row.get(1)?,
            overview_nonce: row.get(2)?,
            details: row.get(3)?,
            details_nonce: row.get(4)?,
            version: row.get(5)?,
            deleted: row.get(6)?,
            pending: row.get(7)?,
        },
    ))
}

fn parse_id((id, mut entry): (String, LocalEntry)) -> Result<LocalEntry> {
    entry.id = Uuid::parse_str(&id)
        .map_err(|e| DatabaseError::Other(format!("Invalid entry id {}: {}", id, e)))?;
    Ok(entry)
}

fn query(conn: &Connection, filter: &str) -> Result<Vec<LocalEntry>> {
    let sql = format!("SELECT {} FROM entries {} ORDER BY rowid", COLUMNS, filter);
    let mut stmt = conn.prepare(&sql).map_err(DatabaseError::Sqlite)?;
    let rows = stmt.query_map([], from_row).map_err(DatabaseError::Sqlite)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(parse_id(row.map_err(DatabaseError::Sqlite)?)?);
    }
    Ok(entries)
}

/// Insert or overwrite an entry with every column taken from `entry`.
pub fn upsert(conn: &Connection, entry: &LocalEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO entries (id, overview, overview_nonce, details, details_nonce, version, deleted, pending)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            overview = excluded.overview,
            overview_nonce = excluded.overview_nonce,
            details = excluded.details,
            details_nonce = excluded.details_nonce,
            version = excluded.version,
            deleted = excluded.deleted,
            pending = excluded.pending",
        params![
            entry.id.to_string(),
            entry.overview,
            entry.overview_nonce,
            entry.details,
            entry.details_nonce,
            entry.version,
            entry.deleted,
            entry.pending,
        ],
    )
    .map_err(DatabaseError::Sqlite)?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<LocalEntry>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM entries WHERE id = ?1", COLUMNS),
            params![id.to_string()],
            from_row,
        )
        .optional()
        .map_err(DatabaseError::Sqlite)?;
    row.map(parse_id).transpose()
}

/// Entries that are not tombstoned
pub fn list_live(conn: &Connection) -> Result<Vec<LocalEntry>> {
    query(conn, "WHERE deleted = 0")
}

/// Entries changed locally since the last acknowledged sync
pub fn list_pending(conn: &Connection) -> Result<Vec<LocalEntry>> {
    query(conn, "WHERE pending = 1")
}

pub fn count_pending(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM entries WHERE pending = 1", [], |row| {
            row.get(0)
        })
        .map_err(DatabaseError::Sqlite)?;
    Ok(count as u64)
}

/// Turn an entry into a pending tombstone. Returns false if it does not exist.
pub fn mark_deleted(conn: &Connection, id: Uuid) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE entries SET deleted = 1, pending = 1 WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(DatabaseError::Sqlite)?;
    Ok(rows == 1)
}
