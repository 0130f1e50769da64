//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lockbox_core::rpc::{ErrorBody, RpcCode};
use thiserror::Error;

/// Server error types mapped to HTTP status codes and RPC codes.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Access token expired")]
    TokenExpired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Object storage failure: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn code(&self) -> RpcCode {
        match self {
            Self::Unauthenticated(_) => RpcCode::Unauthenticated,
            Self::TokenExpired => RpcCode::TokenExpired,
            Self::Unauthorized(_) | Self::Forbidden(_) => RpcCode::Unauthorized,
            Self::RefreshTokenExpired => RpcCode::RefreshTokenExpired,
            Self::VersionConflict(_) => RpcCode::VersionConflict,
            Self::NotFound(_) => RpcCode::NotFound,
            Self::AlreadyExists(_) => RpcCode::AlreadyExists,
            Self::BadRequest(_) => RpcCode::InvalidArgument,
            Self::Storage(_) | Self::Database(_) | Self::Internal(_) => RpcCode::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_)
            | Self::TokenExpired
            | Self::Unauthorized(_)
            | Self::RefreshTokenExpired => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::VersionConflict(_) | Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Database(e) | Self::Internal(e) => {
                tracing::error!("Request failed: {}", e);
                "Internal server error".to_string()
            }
            Self::Storage(e) => {
                tracing::warn!("Object storage failure: {}", e);
                "Object storage failure".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let err = ServerError::TokenExpired;
        assert_eq!(err.code(), RpcCode::TokenExpired);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = ServerError::VersionConflict("x".to_string());
        assert_eq!(err.code(), RpcCode::VersionConflict);
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ServerError::Database("locked".to_string());
        assert_eq!(err.code(), RpcCode::Internal);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = ServerError::Database("no such table: users".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, RpcCode::Internal);
        assert_eq!(body.message, "Internal server error");
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_reported_as_unreachable() {
        let err = ServerError::Storage("connection refused".to_string());
        assert_eq!(err.code(), RpcCode::Internal);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, RpcCode::Internal);
        assert_eq!(body.message, "Object storage failure");
    }
}
