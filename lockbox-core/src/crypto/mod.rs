//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - Argon2id master key derivation and the server-side verifier
//! - AES-256-GCM sealing of serializable values
//! - Per-file keys and file encryption
//! - Zeroizing key containers

pub mod cipher;
pub mod kdf;
pub mod keyring;

pub use cipher::{
    decrypt, decrypt_bytes, decrypt_file_blob, encrypt, encrypt_bytes, encrypt_file,
    EncryptedFile, Sealed,
};
pub use kdf::{derive_master_key, generate_salt, make_verifier, verify_verifier, KdfParams};
pub use keyring::{FileKey, MasterKey, Verifier};

use thiserror::Error;

/// Length of every symmetric key in the vault (AES-256)
pub const KEY_LEN: usize = 32;

/// Length of an AES-GCM nonce
pub const NONCE_LEN: usize = 12;

/// Length of the per-user KDF salt
pub const SALT_LEN: usize = 16;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
/// Alias for Result used by re-exports
pub type CryptoResult<T> = Result<T>;
