//! Zero-knowledge authentication on the client.
//!
//! The password never leaves this process. Registration sends a random salt
//! and the verifier of the derived key; login fetches the salt, re-derives
//! and sends a verifier candidate. Successful online logins cache
//! `{username, salt, verifier}` so the same password can unlock offline.

use crate::connectivity::{ConnectivityMode, ModeTracker};
use crate::crypto::{self, MasterKey};
use crate::database::meta::{self, CachedCredentials};
use crate::database::Database;
use crate::rpc::VaultClient;
use crate::{DatabaseError, Result, VaultError};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Result of a successful login
#[derive(Debug)]
pub struct LoginOutcome {
    pub master_key: MasterKey,
    pub mode: ConnectivityMode,
}

/// Client-side auth flows
#[derive(Clone)]
pub struct AuthService {
    client: VaultClient,
    db: Arc<Mutex<Database>>,
    tracker: ModeTracker,
}

/// Run the memory-hard KDF off the async executor.
async fn derive(password: &str, salt: Vec<u8>) -> Result<MasterKey> {
    let password = Zeroizing::new(password.as_bytes().to_vec());
    tokio::task::spawn_blocking(move || crypto::derive_master_key(&password, &salt))
        .await
        .map_err(|e| VaultError::Internal(format!("Key derivation task: {}", e)))?
        .map_err(VaultError::from)
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(VaultError::InvalidInput("Username cannot be empty".to_string()));
    }
    Ok(())
}

impl AuthService {
    pub fn new(client: VaultClient, db: Arc<Mutex<Database>>, tracker: ModeTracker) -> Self {
        Self {
            client,
            db,
            tracker,
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|e| DatabaseError::LockPoisoned(e.to_string()))?;
        f(&db)
    }

    /// Create an account. The server stores salt and verifier verbatim.
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        validate_username(username)?;

        let salt = crypto::generate_salt();
        let key = derive(password, salt.to_vec()).await?;
        let verifier = crypto::make_verifier(&key);

        self.client
            .register_user(username, &salt, verifier.as_bytes())
            .await?;
        info!("Registered user {}", username);
        Ok(())
    }

    /// Authenticate against the server and refresh the offline cache.
    pub async fn online_login(&self, username: &str, password: &str) -> Result<MasterKey> {
        validate_username(username)?;

        let salt = self.client.get_salt(username).await?;
        let key = derive(password, salt.clone()).await?;
        let verifier = crypto::make_verifier(&key);

        self.client.login(username, verifier.as_bytes()).await?;

        let creds = CachedCredentials {
            username: username.to_string(),
            salt,
            verifier: verifier.to_vec(),
        };
        self.with_db(|db| meta::save_credentials(db.conn(), &creds))?;

        Ok(key)
    }

    /// Unlock from the cached credentials alone.
    pub async fn offline_login(&self, username: &str, password: &str) -> Result<MasterKey> {
        let cached = self
            .with_db(|db| meta::load_credentials(db.conn()))?
            .ok_or(VaultError::LocalDataNotAvailable)?;

        if cached.username != username {
            return Err(VaultError::Unauthorized("Invalid credentials".to_string()));
        }

        let key = derive(password, cached.salt.clone()).await?;
        let candidate = crypto::make_verifier(&key);
        if !crypto::verify_verifier(&cached.verifier, candidate.as_bytes()) {
            return Err(VaultError::Unauthorized("Invalid credentials".to_string()));
        }

        Ok(key)
    }

    /// Online first; offline only when the server is unreachable.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        match self.online_login(username, password).await {
            Ok(master_key) => {
                self.tracker.set(ConnectivityMode::Online);
                info!("Logged in online as {}", username);
                Ok(LoginOutcome {
                    master_key,
                    mode: ConnectivityMode::Online,
                })
            }
            Err(VaultError::Unavailable(reason)) => {
                warn!("Server unavailable ({}), trying offline login", reason);
                let master_key = self.offline_login(username, password).await?;
                self.tracker.set(ConnectivityMode::Offline);
                info!("Logged in offline as {}", username);
                Ok(LoginOutcome {
                    master_key,
                    mode: ConnectivityMode::Offline,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Forget cached credentials and tokens.
    pub fn logout(&self) -> Result<()> {
        self.with_db(|db| meta::clear_credentials(db.conn()))?;
        self.client.clear_session();
        self.tracker.set(ConnectivityMode::Disabled);
        info!("Logged out");
        Ok(())
    }
}
