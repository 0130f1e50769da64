//! HTTP transport: `POST {base}/rpc/{Method}` with JSON bodies.

use crate::rpc::models::{ErrorBody, RpcMethod};
use crate::rpc::transport::RpcTransport;
use crate::rpc::{RpcCode, RpcFailure};
use crate::{Result, VaultError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// reqwest-backed [`RpcTransport`]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_send_error(e: reqwest::Error) -> RpcFailure {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        RpcFailure::unavailable(e.to_string())
    } else {
        RpcFailure::internal(e.to_string())
    }
}

fn map_status(status: StatusCode, body: &[u8]) -> RpcFailure {
    if let Ok(err) = serde_json::from_slice::<ErrorBody>(body) {
        return RpcFailure::new(err.code, err.message);
    }

    let code = match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            RpcCode::Unavailable
        }
        StatusCode::UNAUTHORIZED => RpcCode::Unauthenticated,
        StatusCode::FORBIDDEN => RpcCode::Unauthorized,
        StatusCode::NOT_FOUND => RpcCode::NotFound,
        StatusCode::CONFLICT => RpcCode::VersionConflict,
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => RpcCode::InvalidArgument,
        _ => RpcCode::Internal,
    };
    RpcFailure::new(code, format!("HTTP {}", status))
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        method: RpcMethod,
        access_token: Option<&str>,
        body: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, RpcFailure> {
        let url = format!("{}{}", self.base_url, method.path());
        debug!("RPC {} -> {}", method.as_str(), url);

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(map_send_error)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(map_status(status, &bytes));
        }
        Ok(bytes.to_vec())
    }
}
