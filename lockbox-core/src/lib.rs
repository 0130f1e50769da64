//! Lockbox Client Core
//!
//! This library provides the client side of the lockbox secrets vault:
//! client-side cryptography, the entry envelope codec, the local offline
//! cache, zero-knowledge authentication, the RPC client with transparent
//! token refresh, and the version-based sync engine.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod crypto;
pub mod database;
pub mod envelope;
pub mod rpc;
pub mod sync;
pub mod vault;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthService, LoginOutcome};
pub use config::ClientConfig;
pub use connectivity::{spawn_connectivity_watcher, ConnectivityMode, ModeTracker, WatcherHandle};
pub use crypto::{
    decrypt, derive_master_key, encrypt, make_verifier, CryptoError, CryptoResult, KdfParams,
    MasterKey, Sealed, Verifier,
};
pub use envelope::{Envelope, Overview, Payload};
pub use rpc::{RpcCode, RpcFailure, RpcTransport, VaultClient};
pub use sync::{BlobTransfer, SyncEngine, SyncReport};
pub use vault::{EntrySummary, EntryView, Vault, VaultStatus};

use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// General error type for vault operations.
///
/// Transport-specific failures are folded into this taxonomy at the RPC
/// boundary, so nothing above `rpc` inspects HTTP statuses.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Server unavailable: {0}")]
    Unavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Local data not available")]
    LocalDataNotAvailable,

    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Vault is locked")]
    VaultLocked,

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the local cache store
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}
