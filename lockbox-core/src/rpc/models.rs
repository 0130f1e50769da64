//! Wire models shared by the client and the server.
//!
//! Bodies are JSON; binary fields travel as standard base64 strings.

use crate::database::models::{LocalEntry, LocalFile, UploadStatus};
use crate::rpc::RpcCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RPC methods exposed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    RegisterUser,
    GetSalt,
    Login,
    RefreshToken,
    Ping,
    AddEntry,
    Sync,
    MarkUploaded,
    GetPresignedPutUrl,
    GetPresignedGetUrl,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 10] = [
        RpcMethod::RegisterUser,
        RpcMethod::GetSalt,
        RpcMethod::Login,
        RpcMethod::RefreshToken,
        RpcMethod::Ping,
        RpcMethod::AddEntry,
        RpcMethod::Sync,
        RpcMethod::MarkUploaded,
        RpcMethod::GetPresignedPutUrl,
        RpcMethod::GetPresignedGetUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterUser => "RegisterUser",
            Self::GetSalt => "GetSalt",
            Self::Login => "Login",
            Self::RefreshToken => "RefreshToken",
            Self::Ping => "Ping",
            Self::AddEntry => "AddEntry",
            Self::Sync => "Sync",
            Self::MarkUploaded => "MarkUploaded",
            Self::GetPresignedPutUrl => "GetPresignedPutUrl",
            Self::GetPresignedGetUrl => "GetPresignedGetUrl",
        }
    }

    /// HTTP path the method is served on
    pub fn path(&self) -> String {
        format!("/rpc/{}", self.as_str())
    }

    /// Whether the call must carry an access token
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            Self::RegisterUser | Self::GetSalt | Self::Login | Self::RefreshToken | Self::Ping
        )
    }
}

/// An encrypted entry on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryBlob {
    pub id: Uuid,
    pub version: i64,
    #[serde(with = "base64_bytes")]
    pub overview: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub overview_nonce: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub details: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub details_nonce: Vec<u8>,
    pub deleted: bool,
}

impl From<&LocalEntry> for EntryBlob {
    fn from(e: &LocalEntry) -> Self {
        Self {
            id: e.id,
            version: e.version,
            overview: e.overview.clone(),
            overview_nonce: e.overview_nonce.clone(),
            details: e.details.clone(),
            details_nonce: e.details_nonce.clone(),
            deleted: e.deleted,
        }
    }
}

impl EntryBlob {
    /// Local copy of a server-acknowledged entry
    pub fn into_local(self) -> LocalEntry {
        LocalEntry {
            id: self.id,
            overview: self.overview,
            overview_nonce: self.overview_nonce,
            details: self.details,
            details_nonce: self.details_nonce,
            version: self.version,
            deleted: self.deleted,
            pending: false,
        }
    }
}

/// An encrypted file record on the wire (never the ciphertext itself)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub entry_id: Uuid,
    pub version: i64,
    #[serde(with = "base64_bytes")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub key_nonce: Vec<u8>,
    pub storage_key: Option<String>,
    pub upload_status: UploadStatus,
    pub deleted: bool,
}

impl From<&LocalFile> for FileBlob {
    fn from(f: &LocalFile) -> Self {
        Self {
            entry_id: f.entry_id,
            version: f.version,
            encrypted_key: f.encrypted_key.clone(),
            key_nonce: f.key_nonce.clone(),
            storage_key: f.storage_key.clone(),
            upload_status: f.upload_status,
            deleted: f.deleted,
        }
    }
}

impl FileBlob {
    pub fn into_local(self) -> LocalFile {
        LocalFile {
            entry_id: self.entry_id,
            encrypted_key: self.encrypted_key,
            key_nonce: self.key_nonce,
            storage_key: self.storage_key,
            local_path: None,
            upload_status: self.upload_status,
            version: self.version,
            deleted: self.deleted,
        }
    }
}

/// Instruction to upload one file's ciphertext to a presigned URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTask {
    pub entry_id: Uuid,
    pub storage_key: String,
    pub url: String,
    /// Version assigned to the file record in this sync
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub verifier: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSaltRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSaltResponse {
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub verifier: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEntryRequest {
    pub entry: EntryBlob,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEntryResponse {
    pub version: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    pub entries: Vec<EntryBlob>,
    pub files: Vec<FileBlob>,
    /// Highest server version the client has already incorporated
    pub checkpoint: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    /// The pushed entries with their newly assigned versions
    pub processed: Vec<EntryBlob>,
    /// Entries changed elsewhere since the checkpoint
    pub other_entries: Vec<EntryBlob>,
    pub other_files: Vec<FileBlob>,
    pub upload_tasks: Vec<UploadTask>,
    /// Highest version assigned in this call, 0 if nothing was pushed
    pub max_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkUploadedRequest {
    pub entry_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedPutResponse {
    pub storage_key: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedGetRequest {
    pub entry_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedGetResponse {
    pub url: String,
}

/// JSON body of every failed call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: RpcCode,
    pub message: String,
}

/// Custom base64 serialization for `Vec<u8>`.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
