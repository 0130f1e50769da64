//! Typed RPC client with a token-refresh interceptor.

use crate::rpc::models::*;
use crate::rpc::session::Session;
use crate::rpc::transport::RpcTransport;
use crate::rpc::{RpcCode, RpcFailure};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Client for the vault server's RPC surface
///
/// Every call goes through [`VaultClient::invoke`], which attaches the
/// current access token and, when the server reports an expired token,
/// rotates the token pair once and retries the call once.
#[derive(Clone)]
pub struct VaultClient {
    transport: Arc<dyn RpcTransport>,
    session: Session,
}

impl VaultClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Encode, send, decode. Handles token expiry transparently.
    pub async fn invoke<Req, Resp>(
        &self,
        method: RpcMethod,
        request: &Req,
    ) -> std::result::Result<Resp, RpcFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| RpcFailure::new(RpcCode::InvalidArgument, e.to_string()))?;

        let token = if method.requires_auth() {
            self.session.access_token()
        } else {
            None
        };

        let reply = match self
            .transport
            .call(method, token.as_deref(), body.clone())
            .await
        {
            Err(original) if original.code == RpcCode::TokenExpired && method.requires_auth() => {
                let Some(refresh) = self.session.refresh_token() else {
                    return Err(original);
                };
                debug!("Access token expired during {}, refreshing", method.as_str());
                match self.rotate(&refresh).await {
                    Ok(pair) => {
                        self.transport
                            .call(method, Some(&pair.access_token), body)
                            .await?
                    }
                    Err(e) => {
                        debug!("Token refresh failed: {}", e);
                        return Err(original);
                    }
                }
            }
            other => other?,
        };

        serde_json::from_slice(&reply)
            .map_err(|e| RpcFailure::internal(format!("Invalid {} response: {}", method.as_str(), e)))
    }

    async fn rotate(&self, refresh_token: &str) -> std::result::Result<TokenPair, RpcFailure> {
        let body = serde_json::to_vec(&RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        })
        .map_err(|e| RpcFailure::internal(e.to_string()))?;

        let reply = self
            .transport
            .call(RpcMethod::RefreshToken, None, body)
            .await?;
        let pair: TokenPair = serde_json::from_slice(&reply)
            .map_err(|e| RpcFailure::internal(format!("Invalid token response: {}", e)))?;
        self.session.set(pair.clone());
        Ok(pair)
    }

    pub async fn register_user(&self, username: &str, salt: &[u8], verifier: &[u8]) -> Result<i64> {
        let resp: RegisterResponse = self
            .invoke(
                RpcMethod::RegisterUser,
                &RegisterRequest {
                    username: username.to_string(),
                    salt: salt.to_vec(),
                    verifier: verifier.to_vec(),
                },
            )
            .await?;
        Ok(resp.user_id)
    }

    pub async fn get_salt(&self, username: &str) -> Result<Vec<u8>> {
        let resp: GetSaltResponse = self
            .invoke(
                RpcMethod::GetSalt,
                &GetSaltRequest {
                    username: username.to_string(),
                },
            )
            .await?;
        Ok(resp.salt)
    }

    /// Log in with a verifier candidate and store the issued token pair.
    pub async fn login(&self, username: &str, verifier: &[u8]) -> Result<()> {
        let pair: TokenPair = self
            .invoke(
                RpcMethod::Login,
                &LoginRequest {
                    username: username.to_string(),
                    verifier: verifier.to_vec(),
                },
            )
            .await?;
        self.session.set(pair);
        info!("Authenticated with server as {}", username);
        Ok(())
    }

    /// Explicitly rotate the stored token pair.
    pub async fn refresh_token(&self) -> Result<()> {
        let refresh = self
            .session
            .refresh_token()
            .ok_or_else(|| crate::VaultError::Unauthorized("No refresh token".to_string()))?;
        self.rotate(&refresh).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let _: PingResponse = self.invoke(RpcMethod::Ping, &Empty {}).await?;
        Ok(())
    }

    pub async fn add_entry(&self, entry: EntryBlob) -> Result<i64> {
        let resp: AddEntryResponse = self
            .invoke(RpcMethod::AddEntry, &AddEntryRequest { entry })
            .await?;
        Ok(resp.version)
    }

    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse> {
        Ok(self.invoke(RpcMethod::Sync, request).await?)
    }

    pub async fn mark_uploaded(&self, entry_id: Uuid) -> Result<()> {
        let _: Empty = self
            .invoke(RpcMethod::MarkUploaded, &MarkUploadedRequest { entry_id })
            .await?;
        Ok(())
    }

    pub async fn presigned_put_url(&self) -> Result<PresignedPutResponse> {
        Ok(self.invoke(RpcMethod::GetPresignedPutUrl, &Empty {}).await?)
    }

    pub async fn presigned_get_url(&self, entry_id: Uuid) -> Result<String> {
        let resp: PresignedGetResponse = self
            .invoke(RpcMethod::GetPresignedGetUrl, &PresignedGetRequest { entry_id })
            .await?;
        Ok(resp.url)
    }

    /// Forget the token pair.
    pub fn clear_session(&self) {
        self.session.clear();
    }
}
