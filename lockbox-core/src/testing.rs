//! In-process fakes for the server and object storage used by unit tests.

use crate::rpc::models::*;
use crate::rpc::{RpcCode, RpcFailure, RpcTransport, VaultClient};
use crate::sync::BlobTransfer;
use crate::{Result, VaultError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<String, (Vec<u8>, Vec<u8>)>,
    versions: HashMap<String, i64>,
    entries: BTreeMap<Uuid, (String, EntryBlob)>,
    files: BTreeMap<Uuid, (String, FileBlob)>,
    next_object: u64,
    last_max_version: i64,
}

/// Minimal single-process stand-in for the sync server.
///
/// Access tokens are `access:<username>`; there is no expiry.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<State>,
    down: AtomicBool,
    failure: Mutex<Option<RpcCode>>,
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, RpcFailure> {
    serde_json::from_slice(body).map_err(|e| RpcFailure::new(RpcCode::InvalidArgument, e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> std::result::Result<Vec<u8>, RpcFailure> {
    serde_json::to_vec(value).map_err(|e| RpcFailure::internal(e.to_string()))
}

fn tokens(username: &str) -> TokenPair {
    TokenPair {
        access_token: format!("access:{}", username),
        refresh_token: format!("refresh:{}", username),
    }
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_user(username: &str) -> Arc<Self> {
        let server = Self::new();
        server
            .state
            .lock()
            .unwrap()
            .users
            .insert(username.to_string(), (vec![0; 16], vec![0; 32]));
        server
    }

    /// Give `client` a valid session for `username` without a login round trip.
    pub fn authorize(&self, client: &VaultClient, username: &str) {
        client.session().set(tokens(username));
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Answer every call with `code` until cleared with `None`.
    pub fn fail_with(&self, code: Option<RpcCode>) {
        *self.failure.lock().unwrap() = code;
    }

    pub fn last_max_version(&self) -> i64 {
        self.state.lock().unwrap().last_max_version
    }

    pub fn file_completed(&self, entry_id: Uuid) -> bool {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&entry_id)
            .map(|(_, f)| f.upload_status == crate::database::UploadStatus::Completed)
            .unwrap_or(false)
    }

    fn user_of(token: Option<&str>) -> std::result::Result<String, RpcFailure> {
        token
            .and_then(|t| t.strip_prefix("access:"))
            .map(str::to_string)
            .ok_or_else(|| RpcFailure::new(RpcCode::Unauthenticated, "missing token"))
    }

    fn upsert_entry(state: &mut State, user: &str, mut entry: EntryBlob) -> std::result::Result<EntryBlob, RpcFailure> {
        if let Some((owner, _)) = state.entries.get(&entry.id) {
            if owner != user {
                return Err(RpcFailure::new(RpcCode::VersionConflict, entry.id.to_string()));
            }
        }
        let version = state.versions.entry(user.to_string()).or_insert(0);
        *version += 1;
        entry.version = *version;
        if entry.deleted {
            if let Some((_, file)) = state.files.get_mut(&entry.id) {
                file.deleted = true;
            }
        }
        state.entries.insert(entry.id, (user.to_string(), entry.clone()));
        Ok(entry)
    }

    fn handle(&self, method: RpcMethod, token: Option<&str>, body: &[u8]) -> std::result::Result<Vec<u8>, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        match method {
            RpcMethod::Ping => encode(&PingResponse {
                status: "ok".to_string(),
            }),
            RpcMethod::RegisterUser => {
                let req: RegisterRequest = decode(body)?;
                if state.users.contains_key(&req.username) {
                    return Err(RpcFailure::new(RpcCode::AlreadyExists, req.username));
                }
                state.users.insert(req.username, (req.salt, req.verifier));
                encode(&RegisterResponse {
                    user_id: state.users.len() as i64,
                })
            }
            RpcMethod::GetSalt => {
                let req: GetSaltRequest = decode(body)?;
                let salt = match state.users.get(&req.username) {
                    Some((salt, _)) => salt.clone(),
                    None => crate::crypto::generate_salt().to_vec(),
                };
                encode(&GetSaltResponse { salt })
            }
            RpcMethod::Login => {
                let req: LoginRequest = decode(body)?;
                match state.users.get(&req.username) {
                    Some((_, verifier)) if crate::crypto::verify_verifier(verifier, &req.verifier) => {
                        encode(&tokens(&req.username))
                    }
                    _ => Err(RpcFailure::new(RpcCode::Unauthorized, "invalid credentials")),
                }
            }
            RpcMethod::RefreshToken => {
                let req: RefreshTokenRequest = decode(body)?;
                let user = req
                    .refresh_token
                    .strip_prefix("refresh:")
                    .ok_or_else(|| RpcFailure::new(RpcCode::Unauthorized, "bad refresh token"))?;
                encode(&tokens(user))
            }
            RpcMethod::AddEntry => {
                let user = Self::user_of(token)?;
                let req: AddEntryRequest = decode(body)?;
                let entry = Self::upsert_entry(&mut state, &user, req.entry)?;
                encode(&AddEntryResponse {
                    version: entry.version,
                })
            }
            RpcMethod::Sync => {
                let user = Self::user_of(token)?;
                let req: SyncRequest = decode(body)?;

                let other_entries = state
                    .entries
                    .values()
                    .filter(|(owner, e)| owner == &user && e.version > req.checkpoint)
                    .map(|(_, e)| e.clone())
                    .collect();
                let other_files = state
                    .files
                    .values()
                    .filter(|(owner, f)| owner == &user && f.version > req.checkpoint)
                    .map(|(_, f)| f.clone())
                    .collect();

                let mut max_version = 0;
                let mut processed = Vec::new();
                for entry in req.entries {
                    let entry = Self::upsert_entry(&mut state, &user, entry)?;
                    max_version = entry.version;
                    processed.push(entry);
                }

                let mut upload_tasks = Vec::new();
                for mut file in req.files {
                    state.next_object += 1;
                    let key = format!("obj-{}", state.next_object);
                    let version = state.versions.entry(user.clone()).or_insert(0);
                    *version += 1;
                    file.version = *version;
                    file.storage_key = Some(key.clone());
                    file.upload_status = crate::database::UploadStatus::Pending;
                    max_version = file.version;
                    upload_tasks.push(UploadTask {
                        entry_id: file.entry_id,
                        url: format!("mem://{}", key),
                        storage_key: key,
                        version: file.version,
                    });
                    state.files.insert(file.entry_id, (user.clone(), file));
                }

                state.last_max_version = max_version;
                encode(&SyncResponse {
                    processed,
                    other_entries,
                    other_files,
                    upload_tasks,
                    max_version,
                })
            }
            RpcMethod::MarkUploaded => {
                let user = Self::user_of(token)?;
                let req: MarkUploadedRequest = decode(body)?;
                let owned = matches!(state.files.get(&req.entry_id), Some((owner, _)) if owner == &user);
                if !owned {
                    return Err(RpcFailure::new(RpcCode::NotFound, req.entry_id.to_string()));
                }
                let version = state.versions.entry(user).or_insert(0);
                *version += 1;
                let version = *version;
                match state.files.get_mut(&req.entry_id) {
                    Some((_, file)) => {
                        file.upload_status = crate::database::UploadStatus::Completed;
                        file.version = version;
                        encode(&Empty {})
                    }
                    _ => Err(RpcFailure::new(RpcCode::NotFound, req.entry_id.to_string())),
                }
            }
            RpcMethod::GetPresignedPutUrl => {
                Self::user_of(token)?;
                state.next_object += 1;
                let key = format!("obj-{}", state.next_object);
                encode(&PresignedPutResponse {
                    url: format!("mem://{}", key),
                    storage_key: key,
                })
            }
            RpcMethod::GetPresignedGetUrl => {
                let user = Self::user_of(token)?;
                let req: PresignedGetRequest = decode(body)?;
                match state.files.get(&req.entry_id) {
                    Some((owner, file)) if owner == &user => {
                        let key = file
                            .storage_key
                            .clone()
                            .ok_or_else(|| RpcFailure::new(RpcCode::NotFound, "no storage key"))?;
                        encode(&PresignedGetResponse {
                            url: format!("mem://{}", key),
                        })
                    }
                    _ => Err(RpcFailure::new(RpcCode::NotFound, req.entry_id.to_string())),
                }
            }
        }
    }
}

#[async_trait]
impl RpcTransport for FakeServer {
    async fn call(
        &self,
        method: RpcMethod,
        access_token: Option<&str>,
        body: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, RpcFailure> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RpcFailure::unavailable("connection refused"));
        }
        if let Some(code) = *self.failure.lock().unwrap() {
            return Err(RpcFailure::new(code, "server error"));
        }
        self.handle(method, access_token, &body)
    }
}

/// Object storage held in memory, keyed by URL.
#[derive(Default)]
pub struct FakeBlobs {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl FakeBlobs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self) -> HashMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobTransfer for FakeBlobs {
    async fn put(&self, url: &str, bytes: Vec<u8>) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(VaultError::Internal("Upload failed: HTTP 500".to_string()));
        }
        self.objects.lock().unwrap().insert(url.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(url.to_string()))
    }
}
