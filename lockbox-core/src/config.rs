//! Client configuration loaded from TOML.

use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the vault server, e.g. `http://127.0.0.1:8743`
    pub server_url: String,
    /// Local cache database
    pub database_path: PathBuf,
    /// Where encrypted file attachments wait for upload
    pub staging_dir: PathBuf,
    pub request_timeout_secs: u64,
    /// Connectivity probe interval
    pub ping_interval_secs: u64,
}

/// `<platform data dir>/lockbox`, falling back to `./.lockbox`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("lockbox"))
        .unwrap_or_else(|| PathBuf::from(".lockbox"))
}

/// `<platform config dir>/lockbox/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("lockbox"))
        .unwrap_or_else(|| PathBuf::from(".lockbox"))
        .join("config.toml")
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data = default_data_dir();
        Self {
            server_url: "http://127.0.0.1:8743".to_string(),
            database_path: data.join("vault.db"),
            staging_dir: data.join("staging"),
            request_timeout_secs: 30,
            ping_interval_secs: 15,
        }
    }
}

impl ClientConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| VaultError::InvalidInput(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| VaultError::Internal(format!("Config encoding: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}
