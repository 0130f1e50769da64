//! AES-256-GCM sealing of entries, file keys and file content.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key
//! - 96-bit (12 byte) nonce, freshly random for every call
//! - 128-bit authentication tag, appended to the ciphertext
//!
//! Structured values are serialized to JSON before sealing, so the same
//! value always produces the same plaintext bytes.

use crate::crypto::keyring::FileKey;
use crate::crypto::{CryptoError, Result, KEY_LEN, NONCE_LEN};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Ciphertext (with tag) and the nonce it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Seal raw bytes under `key` with a fresh random nonce
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;

    Ok(Sealed {
        ciphertext,
        nonce: nonce.into(),
    })
}

/// Open bytes sealed by [`encrypt_bytes`]
///
/// Fails with `AuthenticationFailed` on a wrong key or any tampering.
pub fn decrypt_bytes(ciphertext: &[u8], nonce: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
        CryptoError::InvalidNonce(format!("expected {} bytes, got {}", NONCE_LEN, nonce.len()))
    })?;

    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(&Nonce::from(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Serialize `value` and seal it under `key`
pub fn encrypt<T: Serialize>(value: &T, key: &[u8; KEY_LEN]) -> Result<Sealed> {
    let plaintext =
        serde_json::to_vec(value).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    encrypt_bytes(&plaintext, key)
}

/// Open and deserialize a value sealed by [`encrypt`]
pub fn decrypt<T: DeserializeOwned>(
    ciphertext: &[u8],
    nonce: &[u8],
    key: &[u8; KEY_LEN],
) -> Result<T> {
    let plaintext = decrypt_bytes(ciphertext, nonce, key)?;
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Serialization(e.to_string()))
}

/// A file sealed under its own content key
pub struct EncryptedFile {
    pub ciphertext: Vec<u8>,
    pub file_key: FileKey,
    pub nonce: [u8; NONCE_LEN],
}

impl EncryptedFile {
    /// Storage form of the file: `nonce (12 bytes) || ciphertext+tag`
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        blob.extend_from_slice(&self.nonce);
        blob.extend_from_slice(&self.ciphertext);
        blob
    }
}

/// Read and seal a whole file
///
/// A fresh random file key is generated unless one is supplied.
pub fn encrypt_file(path: &Path, key: Option<FileKey>) -> Result<EncryptedFile> {
    let plaintext = std::fs::read(path)?;
    let file_key = key.unwrap_or_else(FileKey::generate);
    let sealed = encrypt_bytes(&plaintext, file_key.as_bytes())?;

    Ok(EncryptedFile {
        ciphertext: sealed.ciphertext,
        file_key,
        nonce: sealed.nonce,
    })
}

/// Open a file blob produced by [`EncryptedFile::to_blob`]
pub fn decrypt_file_blob(blob: &[u8], key: &FileKey) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed(
            "File blob shorter than nonce".to_string(),
        ));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    decrypt_bytes(ciphertext, nonce, key.as_bytes())
}
