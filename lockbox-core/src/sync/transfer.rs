//! Direct-to-storage transfers on presigned URLs.

use crate::Result;
use async_trait::async_trait;

/// Raw PUT/GET of ciphertext against presigned URLs
#[async_trait]
pub trait BlobTransfer: Send + Sync {
    /// Upload bytes; any non-2xx answer is an error.
    async fn put(&self, url: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

#[cfg(feature = "sync")]
pub use http::HttpBlobTransfer;

#[cfg(feature = "sync")]
mod http {
    use super::BlobTransfer;
    use crate::{Result, VaultError};
    use async_trait::async_trait;
    use std::time::Duration;
    use tracing::debug;

    /// reqwest-backed [`BlobTransfer`]
    pub struct HttpBlobTransfer {
        client: reqwest::Client,
    }

    impl HttpBlobTransfer {
        pub fn new(timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| VaultError::Internal(format!("HTTP client: {}", e)))?;
            Ok(Self { client })
        }
    }

    fn map_error(e: reqwest::Error) -> VaultError {
        if e.is_connect() || e.is_timeout() {
            VaultError::Unavailable(e.to_string())
        } else {
            VaultError::Internal(e.to_string())
        }
    }

    #[async_trait]
    impl BlobTransfer for HttpBlobTransfer {
        async fn put(&self, url: &str, bytes: Vec<u8>) -> Result<()> {
            debug!("PUT {} bytes to object storage", bytes.len());
            let resp = self
                .client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes)
                .send()
                .await
                .map_err(map_error)?;

            if !resp.status().is_success() {
                return Err(VaultError::Internal(format!(
                    "Upload failed: HTTP {}",
                    resp.status()
                )));
            }
            Ok(())
        }

        async fn get(&self, url: &str) -> Result<Vec<u8>> {
            let resp = self.client.get(url).send().await.map_err(map_error)?;

            if !resp.status().is_success() {
                return Err(VaultError::Internal(format!(
                    "Download failed: HTTP {}",
                    resp.status()
                )));
            }
            let bytes = resp.bytes().await.map_err(map_error)?;
            Ok(bytes.to_vec())
        }
    }
}
