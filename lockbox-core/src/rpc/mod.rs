//! RPC layer between the vault client and the server.
//!
//! Every method is a unary request/response call. The transport is a seam
//! (`RpcTransport`) so the client logic, including the token refresh
//! interceptor, does not depend on HTTP.

pub mod client;
#[cfg(feature = "sync")]
pub mod http;
pub mod models;
pub mod session;
pub mod transport;

pub use client::VaultClient;
#[cfg(feature = "sync")]
pub use http::HttpTransport;
pub use models::{ErrorBody, RpcMethod, TokenPair};
pub use session::Session;
pub use transport::RpcTransport;

use crate::VaultError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status codes carried by failed RPC calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcCode {
    /// Server unreachable or temporarily unable to serve
    Unavailable,
    /// No usable credential attached
    Unauthenticated,
    /// Access token was valid but has expired
    TokenExpired,
    Unauthorized,
    VersionConflict,
    RefreshTokenExpired,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Internal,
}

/// A failed RPC call, as seen by the client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct RpcFailure {
    pub code: RpcCode,
    pub message: String,
}

impl RpcFailure {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Internal, message)
    }
}

impl From<RpcFailure> for VaultError {
    fn from(f: RpcFailure) -> Self {
        match f.code {
            RpcCode::Unavailable => VaultError::Unavailable(f.message),
            RpcCode::Unauthenticated | RpcCode::TokenExpired | RpcCode::Unauthorized => {
                VaultError::Unauthorized(f.message)
            }
            RpcCode::VersionConflict => VaultError::VersionConflict(f.message),
            RpcCode::RefreshTokenExpired => VaultError::RefreshTokenExpired,
            RpcCode::NotFound => VaultError::NotFound(f.message),
            RpcCode::AlreadyExists => VaultError::AlreadyExists(f.message),
            RpcCode::InvalidArgument => VaultError::InvalidInput(f.message),
            RpcCode::Internal => VaultError::Internal(f.message),
        }
    }
}
