//! Vault facade - coordinates auth, the local cache, crypto and sync

mod file_ops;

use crate::{
    auth::AuthService,
    connectivity::{ConnectivityMode, ModeTracker},
    crypto::{self, MasterKey},
    database::{entries, files, meta, Database, LocalEntry, UploadStatus},
    envelope::{Envelope, MaterializeContext, Overview, Payload},
    rpc::{models::EntryBlob, RpcTransport, VaultClient},
    sync::{BlobTransfer, SyncEngine, SyncReport},
    DatabaseError, Result, VaultError,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Listing row: decrypted overview only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub version: i64,
    pub pending: bool,
}

/// A fully decrypted entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub metadata: BTreeMap<String, String>,
    pub payload: Payload,
    pub version: i64,
    pub pending: bool,
    /// Upload state of the attached file, if any
    pub file_status: Option<UploadStatus>,
}

/// Session and sync summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    pub mode: ConnectivityMode,
    pub username: Option<String>,
    pub unlocked: bool,
    pub checkpoint: i64,
    pub pending_entries: u64,
    pub pending_files: u64,
}

/// The client vault
///
/// Holds the master key in memory between login and logout. Every local
/// write is offline-first: entries are sealed and stored as pending, and
/// reach the server on the next [`Vault::sync`].
pub struct Vault {
    pub(super) db: Arc<Mutex<Database>>,
    pub(super) client: VaultClient,
    pub(super) auth: AuthService,
    pub(super) engine: SyncEngine,
    pub(super) transfer: Arc<dyn BlobTransfer>,
    pub(super) tracker: ModeTracker,
    pub(super) staging_dir: PathBuf,
    pub(super) master_key: Option<MasterKey>,
    pub(super) username: Option<String>,
}

impl Vault {
    /// Assemble a vault over an opened cache and the given collaborators
    pub fn new(
        db: Database,
        transport: Arc<dyn RpcTransport>,
        transfer: Arc<dyn BlobTransfer>,
        staging_dir: PathBuf,
    ) -> Result<Self> {
        db.initialize_schema()?;
        let db = Arc::new(Mutex::new(db));

        let client = VaultClient::new(transport);
        let tracker = ModeTracker::default();
        let auth = AuthService::new(client.clone(), db.clone(), tracker.clone());
        let engine = SyncEngine::new(client.clone(), db.clone(), transfer.clone());

        Ok(Self {
            db,
            client,
            auth,
            engine,
            transfer,
            tracker,
            staging_dir,
            master_key: None,
            username: None,
        })
    }

    /// Open the vault described by a client config, talking HTTP
    #[cfg(feature = "sync")]
    pub fn open(config: &crate::config::ClientConfig) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        let transport = crate::rpc::HttpTransport::new(&config.server_url, config.request_timeout())?;
        let transfer = crate::sync::HttpBlobTransfer::new(config.request_timeout())?;
        Self::new(
            db,
            Arc::new(transport),
            Arc::new(transfer),
            config.staging_dir.clone(),
        )
    }

    pub(super) fn lock_db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| DatabaseError::LockPoisoned(e.to_string()).into())
    }

    pub(super) fn key(&self) -> Result<&MasterKey> {
        self.master_key.as_ref().ok_or(VaultError::VaultLocked)
    }

    pub fn client(&self) -> &VaultClient {
        &self.client
    }

    pub fn tracker(&self) -> &ModeTracker {
        &self.tracker
    }

    pub fn mode(&self) -> ConnectivityMode {
        self.tracker.get()
    }

    pub fn is_unlocked(&self) -> bool {
        self.master_key.is_some()
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        self.auth.register(username, password).await
    }

    /// Log in (online, falling back to offline) and keep the master key.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<ConnectivityMode> {
        let outcome = self.auth.login(username, password).await?;
        self.master_key = Some(outcome.master_key);
        self.username = Some(username.to_string());
        Ok(outcome.mode)
    }

    /// Drop the master key and forget cached credentials and tokens.
    pub fn logout(&mut self) -> Result<()> {
        self.master_key = None;
        self.username = None;
        self.auth.logout()
    }

    /// Seal and store a new entry as pending. File payloads are encrypted
    /// into the staging directory at the same time.
    pub fn add_entry(
        &self,
        title: &str,
        metadata: BTreeMap<String, String>,
        payload: Payload,
    ) -> Result<Uuid> {
        let key = self.key()?;
        let id = Uuid::new_v4();
        let envelope = Envelope::wrap(title, metadata, &payload)?;

        let file = match payload.as_materializable() {
            Some(m) => Some(m.materialize(&MaterializeContext {
                entry_id: id,
                master_key: key,
                staging_dir: &self.staging_dir,
            })?),
            None => None,
        };

        let overview = crypto::encrypt(&envelope.overview(), key.as_bytes())?;
        let details = crypto::encrypt(&envelope, key.as_bytes())?;
        let entry = LocalEntry {
            id,
            overview: overview.ciphertext,
            overview_nonce: overview.nonce.to_vec(),
            details: details.ciphertext,
            details_nonce: details.nonce.to_vec(),
            version: 0,
            deleted: false,
            pending: true,
        };

        let stored: Result<()> = (|| {
            let mut db = self.lock_db()?;
            let tx = db.conn_mut().transaction()?;
            entries::upsert(&tx, &entry)?;
            if let Some(file) = &file {
                files::insert(&tx, file)?;
            }
            tx.commit()?;
            Ok(())
        })();

        if let Err(e) = stored {
            if let Some(path) = file.and_then(|f| f.local_path) {
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }

        debug!("Added {} entry {}", envelope.kind, id);
        Ok(id)
    }

    /// Decrypt the overview of every live entry.
    ///
    /// A row that fails to decrypt is logged and skipped.
    pub fn list(&self) -> Result<Vec<EntrySummary>> {
        let key = self.key()?;
        let rows = {
            let db = self.lock_db()?;
            entries::list_live(db.conn())?
        };

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            match crypto::decrypt::<Overview>(&row.overview, &row.overview_nonce, key.as_bytes()) {
                Ok(overview) => summaries.push(EntrySummary {
                    id: row.id,
                    kind: overview.kind,
                    title: overview.title,
                    version: row.version,
                    pending: row.pending,
                }),
                Err(e) => warn!("Skipping entry {}: {}", row.id, e),
            }
        }
        Ok(summaries)
    }

    /// Decrypt one entry in full.
    pub fn get(&self, id: Uuid) -> Result<EntryView> {
        let key = self.key()?;
        let (row, file) = {
            let db = self.lock_db()?;
            (entries::get(db.conn(), id)?, files::get(db.conn(), id)?)
        };
        let row = row
            .filter(|e| !e.deleted)
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        let envelope: Envelope = crypto::decrypt(&row.details, &row.details_nonce, key.as_bytes())?;
        let payload = envelope.unwrap_payload()?;

        Ok(EntryView {
            id,
            kind: envelope.kind,
            title: envelope.title,
            metadata: envelope.metadata,
            payload,
            version: row.version,
            pending: row.pending,
            file_status: file.filter(|f| !f.deleted).map(|f| f.upload_status),
        })
    }

    /// Tombstone an entry (and its file). The deletion syncs like any edit.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.key()?;
        let detached = {
            let mut db = self.lock_db()?;
            let tx = db.conn_mut().transaction()?;
            let live = entries::get(&tx, id)?.map(|e| !e.deleted).unwrap_or(false);
            if !live || !entries::mark_deleted(&tx, id)? {
                return Err(VaultError::NotFound(id.to_string()));
            }
            let detached = files::mark_deleted(&tx, id)?;
            tx.commit()?;
            detached
        };

        if let Some(path) = detached {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("Could not remove staging file {}: {}", path.display(), e);
            }
        }
        info!("Deleted entry {}", id);
        Ok(())
    }

    fn require_online(&self) -> Result<()> {
        match self.tracker.get() {
            ConnectivityMode::Online => Ok(()),
            mode => Err(VaultError::Unavailable(format!("vault is {}", mode))),
        }
    }

    /// Run one sync cycle. Only allowed while online.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.key()?;
        self.require_online()?;

        match self.engine.sync().await {
            Err(VaultError::Unavailable(reason)) => {
                self.tracker.set(ConnectivityMode::Offline);
                Err(VaultError::Unavailable(reason))
            }
            other => other,
        }
    }

    /// Push a single pending entry right away via `AddEntry`.
    pub async fn push_entry(&self, id: Uuid) -> Result<i64> {
        self.key()?;
        self.require_online()?;

        let entry = {
            let db = self.lock_db()?;
            entries::get(db.conn(), id)?
        }
        .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        let version = self.client.add_entry(EntryBlob::from(&entry)).await?;

        let db = self.lock_db()?;
        entries::upsert(
            db.conn(),
            &LocalEntry {
                version,
                pending: false,
                ..entry
            },
        )?;
        debug!("Pushed entry {} at version {}", id, version);
        Ok(version)
    }

    pub fn status(&self) -> Result<VaultStatus> {
        let db = self.lock_db()?;
        let conn = db.conn();
        Ok(VaultStatus {
            mode: self.tracker.get(),
            username: self.username.clone(),
            unlocked: self.is_unlocked(),
            checkpoint: meta::load_checkpoint(conn)?,
            pending_entries: entries::count_pending(conn)?,
            pending_files: files::count_pending(conn)?,
        })
    }
}
