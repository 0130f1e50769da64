//! Bearer token auth middleware for the RPC routes that need an identity.

use crate::error::ServerError;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Authenticated user id, injected into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

fn bearer_token(headers: &HeaderMap) -> Result<&str, ServerError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthenticated("Missing Authorization header".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::Unauthenticated("Invalid auth scheme".to_string()))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let user_id = {
        let token = bearer_token(request.headers())?;
        state.tokens.verify_access_token(token)?
    };

    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}
