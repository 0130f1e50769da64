//! Entry envelope codec.
//!
//! An [`Envelope`] carries the entry kind, its title, free-form metadata and
//! the serialized typed payload. It is sealed as the entry's "details"; its
//! [`Overview`] (kind + title) is sealed separately so listings never need
//! to open full details.

use crate::crypto::{self, MasterKey};
use crate::database::models::{LocalFile, UploadStatus};
use crate::rpc::models::base64_bytes;
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const KIND_LOGIN: &str = "login";
pub const KIND_NOTE: &str = "note";
pub const KIND_CARD: &str = "card";
pub const KIND_BINARY_FILE: &str = "binary_file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub number: String,
    pub holder: String,
    pub expiry: String,
    pub cvv: String,
}

/// Reference to an attached file
///
/// `source` is only set while the file is being added from local disk; it
/// never leaves this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_name: String,
    pub size: u64,
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl FileRef {
    /// Describe a file on local disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(VaultError::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        Ok(Self {
            file_name,
            size: meta.len(),
            source: Some(path.to_path_buf()),
        })
    }
}

/// Typed payload of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Login(LoginPayload),
    Note(NotePayload),
    Card(CardPayload),
    BinaryFile(FileRef),
    /// A kind this build does not know; kept verbatim.
    Unknown { kind: String, raw: Vec<u8> },
}

impl Payload {
    pub fn kind(&self) -> &str {
        match self {
            Payload::Login(_) => KIND_LOGIN,
            Payload::Note(_) => KIND_NOTE,
            Payload::Card(_) => KIND_CARD,
            Payload::BinaryFile(_) => KIND_BINARY_FILE,
            Payload::Unknown { kind, .. } => kind.as_str(),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Payload::Login(p) => serde_json::to_vec(p),
            Payload::Note(p) => serde_json::to_vec(p),
            Payload::Card(p) => serde_json::to_vec(p),
            Payload::BinaryFile(p) => serde_json::to_vec(p),
            Payload::Unknown { raw, .. } => return Ok(raw.clone()),
        };
        bytes.map_err(|e| VaultError::Internal(format!("Payload encoding: {}", e)))
    }

    /// Payloads that need a companion [`LocalFile`] staged alongside the entry
    pub fn as_materializable(&self) -> Option<&dyn Materialize> {
        match self {
            Payload::BinaryFile(f) => Some(f as &dyn Materialize),
            _ => None,
        }
    }
}

/// The listing projection of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub kind: String,
    pub title: String,
}

/// An entry ready to be sealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub details: Vec<u8>,
}

impl Envelope {
    pub fn wrap(
        title: impl Into<String>,
        metadata: BTreeMap<String, String>,
        payload: &Payload,
    ) -> Result<Self> {
        Ok(Self {
            kind: payload.kind().to_string(),
            title: title.into(),
            metadata,
            details: payload.to_bytes()?,
        })
    }

    pub fn overview(&self) -> Overview {
        Overview {
            kind: self.kind.clone(),
            title: self.title.clone(),
        }
    }

    /// Decode the typed payload. Unknown kinds come back as
    /// [`Payload::Unknown`] rather than failing.
    pub fn unwrap_payload(&self) -> Result<Payload> {
        fn parse<T: serde::de::DeserializeOwned>(kind: &str, bytes: &[u8]) -> Result<T> {
            serde_json::from_slice(bytes)
                .map_err(|e| VaultError::Internal(format!("Corrupt {} payload: {}", kind, e)))
        }

        Ok(match self.kind.as_str() {
            KIND_LOGIN => Payload::Login(parse(KIND_LOGIN, &self.details)?),
            KIND_NOTE => Payload::Note(parse(KIND_NOTE, &self.details)?),
            KIND_CARD => Payload::Card(parse(KIND_CARD, &self.details)?),
            KIND_BINARY_FILE => Payload::BinaryFile(parse(KIND_BINARY_FILE, &self.details)?),
            other => Payload::Unknown {
                kind: other.to_string(),
                raw: self.details.clone(),
            },
        })
    }
}

/// What a payload needs to stage its file
pub struct MaterializeContext<'a> {
    pub entry_id: Uuid,
    pub master_key: &'a MasterKey,
    pub staging_dir: &'a Path,
}

/// Payloads backed by a local file produce the [`LocalFile`] record to be
/// stored with the entry.
pub trait Materialize {
    fn materialize(&self, ctx: &MaterializeContext<'_>) -> Result<LocalFile>;
}

impl Materialize for FileRef {
    /// Encrypt the source file into the staging directory and wrap its key.
    fn materialize(&self, ctx: &MaterializeContext<'_>) -> Result<LocalFile> {
        let source = self.source.as_deref().ok_or_else(|| {
            VaultError::InvalidInput(format!("No local source for {}", self.file_name))
        })?;

        let encrypted = crypto::encrypt_file(source, None)?;

        std::fs::create_dir_all(ctx.staging_dir)?;
        let staged = ctx.staging_dir.join(format!("{}.enc", ctx.entry_id));
        std::fs::write(&staged, encrypted.to_blob())?;

        let wrapped =
            crypto::encrypt_bytes(encrypted.file_key.as_bytes(), ctx.master_key.as_bytes())?;

        Ok(LocalFile {
            entry_id: ctx.entry_id,
            encrypted_key: wrapped.ciphertext,
            key_nonce: wrapped.nonce.to_vec(),
            storage_key: None,
            local_path: Some(staged),
            upload_status: UploadStatus::Pending,
            version: 0,
            deleted: false,
        })
    }
}
