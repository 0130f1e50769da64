use super::Vault;
use crate::{
    connectivity::ConnectivityMode,
    crypto::{self, FileKey},
    database::files,
    envelope::{FileRef, Payload},
    Result, VaultError,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

impl Vault {
    /// Stage a local file as a new BinaryFile entry.
    pub fn add_file(&self, title: &str, path: &Path) -> Result<Uuid> {
        let file_ref = FileRef::from_path(path)?;
        self.add_entry(title, BTreeMap::new(), Payload::BinaryFile(file_ref))
    }

    /// Decrypt an attached file to `dest`.
    ///
    /// Uses the staged ciphertext while the file has not been uploaded yet,
    /// otherwise fetches it through a presigned GET URL. If `dest` is a
    /// directory the original file name is used inside it.
    pub async fn download_file(&self, id: Uuid, dest: &Path) -> Result<PathBuf> {
        let view = self.get(id)?;
        let file_name = match &view.payload {
            Payload::BinaryFile(f) => f.file_name.clone(),
            _ => {
                return Err(VaultError::InvalidInput(format!(
                    "Entry {} is not a file",
                    id
                )))
            }
        };

        let record = {
            let db = self.lock_db()?;
            files::get(db.conn(), id)?
        }
        .filter(|f| !f.deleted)
        .ok_or_else(|| VaultError::NotFound(format!("file for entry {}", id)))?;

        let file_key = {
            let key = self.key()?;
            let raw = Zeroizing::new(crypto::decrypt_bytes(
                &record.encrypted_key,
                &record.key_nonce,
                key.as_bytes(),
            )?);
            FileKey::from_slice(&raw)?
        };

        let blob = match record.local_path.as_deref().filter(|p| p.exists()) {
            Some(staged) => {
                debug!("Reading staged ciphertext for {}", id);
                tokio::fs::read(staged).await?
            }
            None => {
                if self.tracker.get() != ConnectivityMode::Online {
                    return Err(VaultError::Unavailable(
                        "file is only available from the server".to_string(),
                    ));
                }
                let url = self.client.presigned_get_url(id).await?;
                self.transfer.get(&url).await?
            }
        };

        let plaintext = Zeroizing::new(crypto::decrypt_file_blob(&blob, &file_key)?);

        let target = if dest.is_dir() {
            dest.join(&file_name)
        } else {
            dest.to_path_buf()
        };
        tokio::fs::write(&target, plaintext.as_slice()).await?;
        debug!("Wrote {} bytes to {}", plaintext.len(), target.display());
        Ok(target)
    }
}
