//! Access and refresh token lifecycle.
//!
//! Access tokens are `base64url(claims).base64url(hmac)` signed with the
//! server secret. Refresh tokens are random strings; only their SHA-256 is
//! stored, and each one can be exchanged exactly once.

use crate::error::ServerError;
use crate::storage::refresh_tokens;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use lockbox_core::rpc::TokenPair;
use rand::RngCore;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: i64,
    iat: i64,
    exp: i64,
}

pub struct TokenService {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret: secret.to_vec(),
            access_ttl,
            refresh_ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, ServerError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(format!("HMAC key: {}", e)))
    }

    pub fn issue_access_token(&self, user_id: i64) -> Result<String, ServerError> {
        self.issue_access_token_at(user_id, Utc::now().timestamp())
    }

    fn issue_access_token_at(&self, user_id: i64, now: i64) -> Result<String, ServerError> {
        let claims = AccessClaims {
            sub: user_id,
            iat: now,
            exp: now + self.access_ttl.as_secs() as i64,
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| ServerError::Internal(format!("Claims: {}", e)))?;
        let encoded = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", encoded, signature))
    }

    /// Resolve an access token to its user id.
    ///
    /// A bad signature or malformed token is `Unauthenticated`; a valid but
    /// stale token is `TokenExpired`.
    pub fn verify_access_token(&self, token: &str) -> Result<i64, ServerError> {
        self.verify_access_token_at(token, Utc::now().timestamp())
    }

    fn verify_access_token_at(&self, token: &str, now: i64) -> Result<i64, ServerError> {
        let invalid = || ServerError::Unauthenticated("Invalid access token".to_string());

        let (encoded, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let payload = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
        let claims: AccessClaims = serde_json::from_slice(&payload).map_err(|_| invalid())?;

        if claims.exp <= now {
            return Err(ServerError::TokenExpired);
        }
        Ok(claims.sub)
    }

    /// Issue a fresh pair and persist the refresh half.
    pub fn issue_pair(&self, conn: &Connection, user_id: i64) -> Result<TokenPair, ServerError> {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let refresh_token = hex::encode(raw);

        let expires_at = Utc::now().timestamp() + self.refresh_ttl.as_secs() as i64;
        refresh_tokens::insert(conn, &hash_refresh_token(&refresh_token), user_id, expires_at)?;

        Ok(TokenPair {
            access_token: self.issue_access_token(user_id)?,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new pair in one transaction.
    ///
    /// The presented token is consumed even when it turns out to be expired.
    pub fn rotate(&self, conn: &mut Connection, refresh_token: &str) -> Result<TokenPair, ServerError> {
        let tx = conn.transaction()?;

        let (user_id, expires_at) = refresh_tokens::take(&tx, &hash_refresh_token(refresh_token))?
            .ok_or_else(|| ServerError::Unauthorized("Invalid refresh token".to_string()))?;

        if expires_at <= Utc::now().timestamp() {
            tx.commit()?;
            return Err(ServerError::RefreshTokenExpired);
        }

        let pair = self.issue_pair(&tx, user_id)?;
        tx.commit()?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{users, ServerStorage};

    fn service() -> TokenService {
        TokenService::new(b"test-secret", Duration::from_secs(60), Duration::from_secs(3600))
    }

    #[test]
    fn test_access_token_round_trip() {
        let tokens = service();
        let token = tokens.issue_access_token(42).unwrap();
        assert_eq!(tokens.verify_access_token(&token).unwrap(), 42);
    }

    #[test]
    fn test_expired_differs_from_invalid() {
        let tokens = service();
        let token = tokens.issue_access_token_at(42, 1_000).unwrap();

        assert_eq!(tokens.verify_access_token_at(&token, 1_059).unwrap(), 42);
        assert!(matches!(
            tokens.verify_access_token_at(&token, 1_060),
            Err(ServerError::TokenExpired)
        ));

        let other = TokenService::new(b"other", Duration::from_secs(60), Duration::from_secs(60));
        assert!(matches!(
            other.verify_access_token_at(&token, 1_000),
            Err(ServerError::Unauthenticated(_))
        ));
        assert!(matches!(
            tokens.verify_access_token("garbage"),
            Err(ServerError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let tokens = service();
        let token = tokens.issue_access_token(1).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":2,"iat":0,"exp":9999999999}"#);
        let forged = format!("{}.{}", forged_claims, signature);
        assert!(matches!(
            tokens.verify_access_token(&forged),
            Err(ServerError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_rotation_consumes_old_token() {
        let tokens = service();
        let storage = ServerStorage::in_memory().unwrap();
        let mut conn = storage.conn().unwrap();
        let alice = users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();

        let first = tokens.issue_pair(&conn, alice).unwrap();
        let second = tokens.rotate(&mut conn, &first.refresh_token).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(tokens.verify_access_token(&second.access_token).unwrap(), alice);
        assert_eq!(refresh_tokens::count_for_user(&conn, alice).unwrap(), 1);

        assert!(matches!(
            tokens.rotate(&mut conn, &first.refresh_token),
            Err(ServerError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_refresh_token() {
        let tokens = TokenService::new(b"s", Duration::from_secs(60), Duration::ZERO);
        let storage = ServerStorage::in_memory().unwrap();
        let mut conn = storage.conn().unwrap();
        let alice = users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap();

        let pair = tokens.issue_pair(&conn, alice).unwrap();
        assert!(matches!(
            tokens.rotate(&mut conn, &pair.refresh_token),
            Err(ServerError::RefreshTokenExpired)
        ));
        assert_eq!(refresh_tokens::count_for_user(&conn, alice).unwrap(), 0);
    }
}
