//! Versioned sync service.
//!
//! Every pushed entry or file takes the next value of its owner's version
//! counter. All writes of one call share a single transaction, so a failed
//! upsert or ownership check leaves neither rows nor version bumps behind.
//! Presigning happens before the transaction opens.

use crate::error::ServerError;
use crate::objects::ObjectStore;
use crate::storage::{records, users};
use lockbox_core::database::UploadStatus;
use lockbox_core::rpc::models::{EntryBlob, FileBlob, SyncResponse, UploadTask};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

/// A pushed file paired with its freshly issued upload location
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub file: FileBlob,
    pub storage_key: String,
    pub url: String,
}

/// Issue a new storage key and presigned PUT URL for every pushed file.
///
/// Keys are never reused, even when the file was staged by an earlier sync.
pub async fn stage_uploads(objects: &dyn ObjectStore, files: Vec<FileBlob>) -> Result<Vec<StagedFile>, ServerError> {
    let mut staged = Vec::with_capacity(files.len());
    for file in files {
        let storage_key = Uuid::new_v4().to_string();
        let url = objects.presign_put(&storage_key).await?;
        staged.push(StagedFile {
            file,
            storage_key,
            url,
        });
    }
    Ok(staged)
}

/// Version and store one entry. A tombstone also tombstones its file.
fn write_entry(conn: &Connection, user_id: i64, mut entry: EntryBlob) -> Result<EntryBlob, ServerError> {
    entry.version = users::next_version(conn, user_id)?;
    records::upsert_entry(conn, user_id, &entry)?;
    if entry.deleted {
        records::mark_file_deleted(conn, user_id, entry.id)?;
    }
    Ok(entry)
}

pub fn apply(
    conn: &mut Connection,
    user_id: i64,
    checkpoint: i64,
    entries: Vec<EntryBlob>,
    staged: Vec<StagedFile>,
) -> Result<SyncResponse, ServerError> {
    let tx = conn.transaction()?;

    let other_entries = records::changed_entries(&tx, user_id, checkpoint)?;
    let other_files = records::changed_files(&tx, user_id, checkpoint)?;

    let mut max_version = 0;
    let mut processed = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = write_entry(&tx, user_id, entry)?;
        max_version = entry.version;
        processed.push(entry);
    }

    let mut upload_tasks = Vec::with_capacity(staged.len());
    for StagedFile {
        mut file,
        storage_key,
        url,
    } in staged
    {
        file.version = users::next_version(&tx, user_id)?;
        file.storage_key = Some(storage_key.clone());
        file.upload_status = UploadStatus::Pending;
        records::upsert_file(&tx, user_id, &file)?;

        max_version = file.version;
        upload_tasks.push(UploadTask {
            entry_id: file.entry_id,
            storage_key,
            url,
            version: file.version,
        });
    }

    tx.commit()?;

    debug!(
        "User {}: {} entries, {} files pushed; {} entries, {} files returned",
        user_id,
        processed.len(),
        upload_tasks.len(),
        other_entries.len(),
        other_files.len()
    );

    Ok(SyncResponse {
        processed,
        other_entries,
        other_files,
        upload_tasks,
        max_version,
    })
}

/// Push a single entry outside of a full sync.
pub fn add_entry(conn: &mut Connection, user_id: i64, entry: EntryBlob) -> Result<i64, ServerError> {
    let tx = conn.transaction()?;
    let entry = write_entry(&tx, user_id, entry)?;
    tx.commit()?;
    Ok(entry.version)
}

/// Record a finished upload. The completion takes a new version so devices
/// that already saw the pending file pick it up on their next sync.
pub fn mark_uploaded(conn: &mut Connection, user_id: i64, entry_id: Uuid) -> Result<i64, ServerError> {
    let tx = conn.transaction()?;
    let version = users::next_version(&tx, user_id)?;
    records::mark_uploaded(&tx, user_id, entry_id, version)?;
    tx.commit()?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ServerStorage;
    use async_trait::async_trait;

    struct SignedUrls;

    #[async_trait]
    impl ObjectStore for SignedUrls {
        async fn presign_put(&self, storage_key: &str) -> Result<String, ServerError> {
            Ok(format!("mem://put/{}", storage_key))
        }

        async fn presign_get(&self, storage_key: &str) -> Result<String, ServerError> {
            Ok(format!("mem://get/{}", storage_key))
        }
    }

    fn entry(marker: u8) -> EntryBlob {
        EntryBlob {
            id: Uuid::new_v4(),
            version: 0,
            overview: vec![marker; 8],
            overview_nonce: vec![0; 12],
            details: vec![marker; 16],
            details_nonce: vec![1; 12],
            deleted: false,
        }
    }

    fn file(entry_id: Uuid) -> FileBlob {
        FileBlob {
            entry_id,
            version: 0,
            encrypted_key: vec![7; 48],
            key_nonce: vec![8; 12],
            storage_key: None,
            upload_status: UploadStatus::Pending,
            deleted: false,
        }
    }

    fn setup() -> (ServerStorage, i64, i64) {
        let storage = ServerStorage::in_memory().unwrap();
        let (alice, bob) = {
            let conn = storage.conn().unwrap();
            (
                users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap(),
                users::insert(&conn, "bob", &[1; 16], &[2; 32]).unwrap(),
            )
        };
        (storage, alice, bob)
    }

    #[test]
    fn test_versions_strictly_increase() {
        let (storage, alice, _) = setup();
        let mut conn = storage.conn().unwrap();

        let resp = apply(&mut conn, alice, 0, vec![entry(1), entry(2), entry(3)], vec![]).unwrap();
        let versions: Vec<i64> = resp.processed.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(resp.max_version, 3);
        assert!(resp.other_entries.is_empty());
    }

    #[test]
    fn test_second_empty_sync_is_quiet() {
        let (storage, alice, _) = setup();
        let mut conn = storage.conn().unwrap();

        let first = apply(&mut conn, alice, 0, vec![entry(1)], vec![]).unwrap();
        let second = apply(&mut conn, alice, first.max_version, vec![], vec![]).unwrap();
        assert!(second.other_entries.is_empty());
        assert!(second.other_files.is_empty());
        assert_eq!(second.max_version, 0);
    }

    #[test]
    fn test_other_updates_are_per_user() {
        let (storage, alice, bob) = setup();
        let mut conn = storage.conn().unwrap();

        let pushed = apply(&mut conn, alice, 0, vec![entry(1)], vec![]).unwrap();
        apply(&mut conn, bob, 0, vec![entry(9)], vec![]).unwrap();

        // Another of alice's devices, never synced before
        let resp = apply(&mut conn, alice, 0, vec![], vec![]).unwrap();
        assert_eq!(resp.other_entries, pushed.processed);

        let resp = apply(&mut conn, bob, 0, vec![], vec![]).unwrap();
        assert_eq!(resp.other_entries.len(), 1);
        assert_eq!(resp.other_entries[0].overview, vec![9; 8]);
    }

    #[test]
    fn test_ownership_conflict_rolls_back_batch() {
        let (storage, alice, bob) = setup();
        let mut conn = storage.conn().unwrap();

        let owned = entry(1);
        apply(&mut conn, alice, 0, vec![owned.clone()], vec![]).unwrap();

        let innocent = entry(5);
        let mut stolen = entry(6);
        stolen.id = owned.id;
        let err = apply(&mut conn, bob, 0, vec![innocent.clone(), stolen], vec![]).unwrap_err();
        assert!(matches!(err, ServerError::VersionConflict(_)));

        assert!(records::get_entry(&conn, bob, innocent.id).unwrap().is_none());
        assert_eq!(users::current_version(&conn, bob).unwrap(), 0);

        let kept = records::get_entry(&conn, alice, owned.id).unwrap().unwrap();
        assert_eq!(kept.overview, vec![1; 8]);
    }

    #[tokio::test]
    async fn test_files_get_fresh_upload_tasks() {
        let (storage, alice, _) = setup();
        let note = entry(1);
        let pending = file(note.id);

        let first = stage_uploads(&SignedUrls, vec![pending.clone()]).await.unwrap();
        let second = stage_uploads(&SignedUrls, vec![pending]).await.unwrap();
        assert_ne!(first[0].storage_key, second[0].storage_key);

        let mut conn = storage.conn().unwrap();
        let resp = apply(&mut conn, alice, 0, vec![note], first.clone()).unwrap();
        assert_eq!(resp.upload_tasks.len(), 1);
        let task = &resp.upload_tasks[0];
        assert_eq!(task.version, 2);
        assert_eq!(task.url, format!("mem://put/{}", first[0].storage_key));
        assert_eq!(resp.max_version, 2);

        let resp = apply(&mut conn, alice, 2, vec![], second.clone()).unwrap();
        assert_eq!(resp.upload_tasks[0].version, 3);
        assert_eq!(
            records::storage_key(&conn, alice, resp.upload_tasks[0].entry_id).unwrap(),
            second[0].storage_key
        );
    }

    #[test]
    fn test_tombstone_marks_file_deleted() {
        let (storage, alice, _) = setup();
        let mut conn = storage.conn().unwrap();

        let mut note = entry(1);
        let staged = StagedFile {
            file: file(note.id),
            storage_key: "k1".to_string(),
            url: "mem://put/k1".to_string(),
        };
        apply(&mut conn, alice, 0, vec![note.clone()], vec![staged]).unwrap();

        note.deleted = true;
        let version = add_entry(&mut conn, alice, note.clone()).unwrap();
        assert_eq!(version, 3);

        let files = records::changed_files(&conn, alice, 0).unwrap();
        assert!(files[0].deleted);
        assert!(records::get_entry(&conn, alice, note.id).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_upload_completion_reaches_synced_devices() {
        let (storage, alice, bob) = setup();
        let mut conn = storage.conn().unwrap();

        let note = entry(1);
        let staged = StagedFile {
            file: file(note.id),
            storage_key: "k1".to_string(),
            url: "mem://put/k1".to_string(),
        };
        let pushed = apply(&mut conn, alice, 0, vec![note.clone()], vec![staged]).unwrap();

        // A second device syncs while the upload is still in flight.
        let phone = apply(&mut conn, alice, 0, vec![], vec![]).unwrap();
        assert_eq!(phone.other_files[0].upload_status, UploadStatus::Pending);

        let version = mark_uploaded(&mut conn, alice, note.id).unwrap();
        assert!(version > pushed.max_version);

        let resp = apply(&mut conn, alice, pushed.max_version, vec![], vec![]).unwrap();
        assert_eq!(resp.other_files.len(), 1);
        assert_eq!(resp.other_files[0].upload_status, UploadStatus::Completed);
        assert_eq!(resp.other_files[0].version, version);

        let err = mark_uploaded(&mut conn, bob, note.id).unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
        assert_eq!(users::current_version(&conn, bob).unwrap(), 0);
    }
}
