//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_path: PathBuf,
    /// Directory holding uploaded file ciphertexts
    pub storage_dir: PathBuf,
    /// Base URL clients use to reach this server; presigned URLs point here
    pub public_url: String,
    /// HMAC secret for access tokens and presigned URLs. Random per process
    /// when unset, which invalidates tokens and URLs on restart.
    pub token_secret: Option<String>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub presign_ttl_secs: u64,
    pub max_payload_size: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            database_path: PathBuf::from("lockbox.db"),
            storage_dir: PathBuf::from("objects"),
            public_url: "http://127.0.0.1:8743".to_string(),
            token_secret: None,
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            presign_ttl_secs: 900,
            max_payload_size: 32 * 1024 * 1024,
            cleanup_interval_secs: 3600,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
