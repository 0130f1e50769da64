//! Object storage staging.
//!
//! File ciphertexts never pass through the RPC layer. The sync service hands
//! out presigned, time-limited URLs and clients PUT/GET the raw bytes there.
//! [`LocalObjectStore`] keeps objects on disk and serves those URLs from this
//! same process under `/objects/{key}`.

use crate::error::ServerError;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, Method};
use axum::response::IntoResponse;
use axum::routing::put;
use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Issues presigned URLs for objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn presign_put(&self, storage_key: &str) -> Result<String, ServerError>;
    async fn presign_get(&self, storage_key: &str) -> Result<String, ServerError>;
}

/// Filesystem-backed object store that signs URLs pointing back at itself
pub struct LocalObjectStore {
    root: PathBuf,
    public_url: String,
    secret: Vec<u8>,
    ttl: Duration,
}

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub method: String,
    pub expires: i64,
    pub signature: String,
}

pub(crate) fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= 128 && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, public_url: &str, secret: &[u8], ttl: Duration) -> Result<Self, ServerError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
            secret: secret.to_vec(),
            ttl,
        })
    }

    fn signature(&self, method: &str, key: &str, expires: i64) -> Result<HmacSha256, ServerError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(format!("HMAC key: {}", e)))?;
        mac.update(format!("object\n{}\n{}\n{}", method, key, expires).as_bytes());
        Ok(mac)
    }

    fn sign_url(&self, method: &str, key: &str, now: i64) -> Result<String, ServerError> {
        if !valid_key(key) {
            return Err(ServerError::BadRequest(format!("Invalid storage key: {}", key)));
        }
        let expires = now + self.ttl.as_secs() as i64;
        let signature = hex::encode(self.signature(method, key, expires)?.finalize().into_bytes());
        Ok(format!(
            "{}/objects/{}?method={}&expires={}&signature={}",
            self.public_url, key, method, expires, signature
        ))
    }

    /// Check a presented URL against the request method and the clock.
    pub fn verify(&self, method: &Method, key: &str, params: &SignedParams, now: i64) -> Result<(), ServerError> {
        if !valid_key(key) {
            return Err(ServerError::BadRequest("Invalid storage key".to_string()));
        }
        if params.method != method.as_str() {
            return Err(ServerError::Forbidden("URL not valid for this method".to_string()));
        }

        let signature = hex::decode(&params.signature)
            .map_err(|_| ServerError::Forbidden("Malformed signature".to_string()))?;
        self.signature(&params.method, key, params.expires)?
            .verify_slice(&signature)
            .map_err(|_| ServerError::Forbidden("Bad signature".to_string()))?;

        if params.expires < now {
            return Err(ServerError::Forbidden("URL expired".to_string()));
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), ServerError> {
        let path = self.object_path(key);
        let tmp = self.root.join(format!("{}.part", key));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Stored object {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, ServerError> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServerError::NotFound(format!("object {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn presign_put(&self, storage_key: &str) -> Result<String, ServerError> {
        self.sign_url("PUT", storage_key, Utc::now().timestamp())
    }

    async fn presign_get(&self, storage_key: &str) -> Result<String, ServerError> {
        self.sign_url("GET", storage_key, Utc::now().timestamp())
    }
}

async fn put_object(
    State(store): State<Arc<LocalObjectStore>>,
    UrlPath(key): UrlPath<String>,
    Query(params): Query<SignedParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
    store.verify(&Method::PUT, &key, &params, Utc::now().timestamp())?;
    store.write(&key, &body).await?;
    Ok(())
}

async fn get_object(
    State(store): State<Arc<LocalObjectStore>>,
    UrlPath(key): UrlPath<String>,
    Query(params): Query<SignedParams>,
) -> Result<impl IntoResponse, ServerError> {
    store.verify(&Method::GET, &key, &params, Utc::now().timestamp())?;
    let bytes = store.read(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// Routes serving presigned URLs, to be nested under `/objects`.
pub fn router(store: Arc<LocalObjectStore>) -> Router {
    Router::new()
        .route("/{key}", put(put_object).get(get_object))
        .with_state(store)
}
