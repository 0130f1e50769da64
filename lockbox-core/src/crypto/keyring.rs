//! Key containers.
//!
//! Master Password → Argon2id → Master Key → seals entries and wraps file keys.
//! Keys zeroize themselves on drop and never implement `Serialize`.

use crate::crypto::{CryptoError, Result, KEY_LEN};
use aes_gcm::{aead::KeyInit, aead::OsRng, Aes256Gcm};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The master key derived from the master password
///
/// Lives only in process memory: it is created on login and dropped
/// (and therefore wiped) on logout.
#[derive(ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a master key from raw bytes
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Get a reference to the key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// A per-file content key
///
/// Stored only in wrapped form (sealed with the master key).
#[derive(Clone)]
pub struct FileKey {
    key: [u8; KEY_LEN],
}

impl FileKey {
    /// Generate a new random file key
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self { key: key.into() }
    }

    /// Rebuild a file key from unwrapped bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self { key })
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileKey(..)")
    }
}

/// One-way digest of a master key, safe to persist server-side
#[derive(Clone, PartialEq, Eq)]
pub struct Verifier([u8; 32]);

impl Verifier {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Verifier(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_generation() {
        let a = FileKey::generate();
        let b = FileKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_file_key_from_slice_checks_length() {
        assert!(FileKey::from_slice(&[0u8; 16]).is_err());
        let key = FileKey::from_slice(&[9u8; KEY_LEN]).unwrap();
        assert_eq!(key.as_bytes(), &[9u8; KEY_LEN]);
    }

    #[test]
    fn test_debug_does_not_leak() {
        let key = MasterKey::from_bytes([0xAB; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "MasterKey(..)");
        assert_eq!(format!("{:?}", FileKey::generate()), "FileKey(..)");
    }
}
