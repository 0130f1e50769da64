//! Local cache models.

use crate::DatabaseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// An encrypted entry as cached on this device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub id: Uuid,
    pub overview: Vec<u8>,
    pub overview_nonce: Vec<u8>,
    pub details: Vec<u8>,
    pub details_nonce: Vec<u8>,
    /// Last server-assigned version; 0 until first synced
    pub version: i64,
    pub deleted: bool,
    /// Changed locally and not yet acknowledged by the server
    pub pending: bool,
}

/// Upload state of a file's ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Completed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "completed" => Ok(UploadStatus::Completed),
            other => Err(DatabaseError::Other(format!(
                "Unknown upload status: {}",
                other
            ))),
        }
    }
}

/// A file attachment record
///
/// The ciphertext itself lives either in the staging directory
/// (`local_path`) or in object storage (`storage_key`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub entry_id: Uuid,
    /// File key sealed with the master key
    pub encrypted_key: Vec<u8>,
    pub key_nonce: Vec<u8>,
    pub storage_key: Option<String>,
    pub local_path: Option<PathBuf>,
    pub upload_status: UploadStatus,
    pub version: i64,
    pub deleted: bool,
}

impl LocalFile {
    /// Has staged ciphertext that still needs to reach object storage
    pub fn is_pending_upload(&self) -> bool {
        self.upload_status == UploadStatus::Pending && self.local_path.is_some() && !self.deleted
    }
}
