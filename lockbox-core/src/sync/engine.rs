//! Sync engine: push pending rows, apply the server's answer, stage uploads.

use crate::database::{entries, files, meta, Database};
use crate::rpc::models::{EntryBlob, FileBlob, SyncRequest};
use crate::rpc::VaultClient;
use crate::sync::transfer::BlobTransfer;
use crate::{DatabaseError, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Counters for one completed sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed_entries: usize,
    pub pushed_files: usize,
    pub received_entries: usize,
    pub received_files: usize,
    pub uploaded_files: usize,
    /// Checkpoint persisted at the end of the cycle
    pub checkpoint: i64,
}

/// Orchestrates one push/apply/upload cycle against the server.
#[derive(Clone)]
pub struct SyncEngine {
    client: VaultClient,
    db: Arc<Mutex<Database>>,
    transfer: Arc<dyn BlobTransfer>,
}

impl SyncEngine {
    pub fn new(client: VaultClient, db: Arc<Mutex<Database>>, transfer: Arc<dyn BlobTransfer>) -> Self {
        Self {
            client,
            db,
            transfer,
        }
    }

    fn lock(&self, context: &str) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned(context.to_string()).into())
    }

    /// Run a full sync cycle.
    ///
    /// On any failure the checkpoint stays where it was, so the next cycle
    /// asks for the same range again. Staged files whose upload failed stay
    /// pending and are retried with a fresh upload task.
    pub async fn sync(&self) -> Result<SyncReport> {
        // 1. Collect pending work
        let request = {
            let db = self.lock("collect")?;
            let conn = db.conn();
            SyncRequest {
                entries: entries::list_pending(conn)?
                    .iter()
                    .map(EntryBlob::from)
                    .collect(),
                files: files::list_pending(conn)?.iter().map(FileBlob::from).collect(),
                checkpoint: meta::load_checkpoint(conn)?,
            }
        };

        let mut report = SyncReport {
            pushed_entries: request.entries.len(),
            pushed_files: request.files.len(),
            ..Default::default()
        };
        debug!(
            "Sync: pushing {} entries, {} files since version {}",
            report.pushed_entries, report.pushed_files, request.checkpoint
        );

        // 2. Round trip
        let response = self.client.sync(&request).await?;

        // 3. Apply other devices' changes, then our own acknowledged entries
        let mut checkpoint = request.checkpoint.max(response.max_version);
        let detached = {
            let mut db = self.lock("apply")?;
            let tx = db.conn_mut().transaction().map_err(DatabaseError::Sqlite)?;
            let mut detached: Vec<PathBuf> = Vec::new();

            for entry in &response.other_entries {
                checkpoint = checkpoint.max(entry.version);
                entries::upsert(&tx, &entry.clone().into_local())?;
                if entry.deleted {
                    detached.extend(files::mark_deleted(&tx, entry.id)?);
                }
            }
            for file in &response.other_files {
                checkpoint = checkpoint.max(file.version);
                files::upsert_from_server(&tx, &file.clone().into_local())?;
            }
            for entry in &response.processed {
                checkpoint = checkpoint.max(entry.version);
                entries::upsert(&tx, &entry.clone().into_local())?;
            }

            tx.commit().map_err(DatabaseError::Sqlite)?;
            detached
        };
        report.received_entries = response.other_entries.len();
        report.received_files = response.other_files.len();

        for path in detached {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!("Could not remove detached staging file {}: {}", path.display(), e);
            }
        }

        // 4. Upload staged ciphertext
        for task in &response.upload_tasks {
            let staged = {
                let db = self.lock("upload")?;
                files::get(db.conn(), task.entry_id)?
                    .filter(|f| f.is_pending_upload())
                    .and_then(|f| f.local_path)
            };
            let Some(path) = staged else {
                debug!("No staged ciphertext for {}, skipping task", task.entry_id);
                continue;
            };

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        "Staging file {} for entry {} is gone, detaching it",
                        path.display(),
                        task.entry_id
                    );
                    let db = self.lock("detach staging")?;
                    files::detach_staging(db.conn(), task.entry_id)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = self.transfer.put(&task.url, bytes).await {
                warn!("Upload of file for entry {} failed: {}", task.entry_id, e);
                return Err(e);
            }

            self.client.mark_uploaded(task.entry_id).await?;
            {
                let db = self.lock("mark uploaded")?;
                files::mark_completed(db.conn(), task.entry_id, &task.storage_key, task.version)?;
            }
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Could not remove staging file {}: {}", path.display(), e);
            }
            report.uploaded_files += 1;
        }

        // 5. Advance the checkpoint
        {
            let db = self.lock("checkpoint")?;
            meta::save_checkpoint(db.conn(), checkpoint)?;
        }
        report.checkpoint = checkpoint;

        info!(
            "Sync complete: pushed {} entries / {} files, received {} entries / {} files, uploaded {}, checkpoint {}",
            report.pushed_entries,
            report.pushed_files,
            report.received_entries,
            report.received_files,
            report.uploaded_files,
            report.checkpoint
        );
        Ok(report)
    }
}
