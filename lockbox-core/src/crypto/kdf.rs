//! Argon2id key derivation for the master password.
//!
//! Every client build uses the same fixed parameters:
//! - Memory cost: 64 MB (65,536 KiB)
//! - Time cost: 3 iterations
//! - Parallelism: 4 lanes
//! - Output length: 32 bytes (256 bits)
//! - Salt length: 16 bytes (random, per user, stored server-side)
//!
//! Changing any of these values makes existing accounts unrecoverable: the
//! server only holds a verifier of the derived key.

use crate::crypto::keyring::{MasterKey, Verifier};
use crate::crypto::{CryptoError, Result, KEY_LEN, SALT_LEN};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Domain separator mixed into the verifier digest so it can never be
/// confused with a hash of the key used for anything else.
const VERIFIER_CONTEXT: &[u8] = b"lockbox/verifier/v1";

/// Parameters for Argon2id key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost: u32,

    /// Time cost (number of iterations)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl KdfParams {
    /// The parameters shared by every client build.
    pub const STANDARD: KdfParams = KdfParams {
        mem_cost: 65_536,
        time_cost: 3,
        parallelism: 4,
    };

    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost < 65_536 {
            return Err(CryptoError::KdfFailed(
                "Memory cost too low (minimum: 64 MB)".to_string(),
            ));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// Derive a 32-byte key from `password` and `salt` with these parameters.
    pub fn derive(&self, password: &[u8], salt: &[u8]) -> Result<MasterKey> {
        self.validate()?;

        if salt.len() != SALT_LEN {
            return Err(CryptoError::KdfFailed(format!(
                "Salt must be {} bytes, got {}",
                SALT_LEN,
                salt.len()
            )));
        }

        let params = Params::new(
            self.mem_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

        Ok(MasterKey::from_bytes(key))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Generate a fresh random per-user salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    rand::random()
}

/// Derive the master key from a password using the standard parameters
///
/// The result is bit-identical for the same `(password, salt)` on every
/// platform and process, which is what makes offline login possible.
pub fn derive_master_key(password: &[u8], salt: &[u8]) -> Result<MasterKey> {
    KdfParams::STANDARD.derive(password, salt)
}

/// Compute the one-way verifier of a master key.
///
/// The verifier is safe to store on the server; it is only ever compared,
/// never used as key material.
pub fn make_verifier(key: &MasterKey) -> Verifier {
    let mut hasher = Sha256::new();
    hasher.update(VERIFIER_CONTEXT);
    hasher.update(key.as_bytes());
    Verifier::from_bytes(hasher.finalize().into())
}

/// Constant-time comparison of a stored verifier with a candidate.
pub fn verify_verifier(stored: &[u8], candidate: &[u8]) -> bool {
    if stored.len() != candidate.len() {
        return false;
    }
    stored.ct_eq(candidate).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_params_default() {
        let params = KdfParams::default();
        assert_eq!(params, KdfParams::STANDARD);
        assert_eq!(params.mem_cost, 65_536);
        assert_eq!(params.time_cost, 3);
        assert_eq!(params.parallelism, 4);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_kdf_params_validation() {
        let mut params = KdfParams::default();

        params.mem_cost = 1000;
        assert!(params.validate().is_err());

        params.mem_cost = 65_536;
        params.time_cost = 0;
        assert!(params.validate().is_err());

        params.time_cost = 3;
        params.parallelism = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_derive_master_key_is_deterministic() {
        let password = b"test_password_123!";
        let salt = generate_salt();

        let key1 = derive_master_key(password, &salt).unwrap();
        let key2 = derive_master_key(password, &salt).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let key3 = derive_master_key(b"different_password", &salt).unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());

        let other_salt = generate_salt();
        let key4 = derive_master_key(password, &other_salt).unwrap();
        assert_ne!(key1.as_bytes(), key4.as_bytes());
    }

    #[test]
    fn test_known_salt_produces_stable_key() {
        let salt = [7u8; SALT_LEN];
        let a = derive_master_key(b"pw1", &salt).unwrap();
        let b = KdfParams::STANDARD.derive(b"pw1", &salt).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.as_bytes().len(), KEY_LEN);
    }

    #[test]
    fn test_known_answer_vector() {
        // Argon2id v0x13, m=65536 t=3 p=4, computed independently of this crate.
        let key = derive_master_key(b"pw1", &[7u8; SALT_LEN]).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "5328d623e91b3c90b554ebdeea5864ed5b5e7e93c3e9cace22c7fd19d1cff624"
        );
        assert_eq!(
            hex::encode(make_verifier(&key).as_bytes()),
            "e7307c6582fa79d7492f083a6ab9179a71172c28aab3c92546846c400de57256"
        );
    }

    #[test]
    fn test_wrong_salt_length_rejected() {
        assert!(derive_master_key(b"pw", &[1u8; 8]).is_err());
    }

    #[test]
    fn test_verifier_matches_only_same_key() {
        let salt = generate_salt();
        let key = derive_master_key(b"correct", &salt).unwrap();
        let wrong = derive_master_key(b"wrong", &salt).unwrap();

        let stored = make_verifier(&key);
        assert!(verify_verifier(stored.as_bytes(), make_verifier(&key).as_bytes()));
        assert!(!verify_verifier(stored.as_bytes(), make_verifier(&wrong).as_bytes()));
        assert_ne!(stored.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_verify_verifier_length_mismatch() {
        assert!(!verify_verifier(&[1, 2, 3], &[1, 2]));
        assert!(verify_verifier(&[], &[]));
    }
}
