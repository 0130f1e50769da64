//! Registration, zero-knowledge login and token refresh.
//!
//! The server only ever sees the salt and the verifier. It never checks
//! them for cryptographic sense; it stores and compares.

use crate::error::ServerError;
use crate::server::AppState;
use crate::storage::users;
use axum::extract::State;
use axum::Json;
use lockbox_core::crypto::{generate_salt, verify_verifier};
use lockbox_core::rpc::models::{
    GetSaltRequest, GetSaltResponse, LoginRequest, PingResponse, RefreshTokenRequest,
    RegisterRequest, RegisterResponse, TokenPair,
};
use tracing::{info, warn};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ServerError> {
    if req.username.trim().is_empty() {
        return Err(ServerError::BadRequest("Username must not be empty".to_string()));
    }
    if req.salt.is_empty() || req.verifier.is_empty() {
        return Err(ServerError::BadRequest("Salt and verifier are required".to_string()));
    }

    let user_id = {
        let conn = state.storage.conn()?;
        users::insert(&conn, &req.username, &req.salt, &req.verifier)?
    };

    info!("Registered user {}", user_id);
    Ok(Json(RegisterResponse { user_id }))
}

/// Stored salt, or a fresh random one of the same size for unknown users.
pub async fn get_salt(
    State(state): State<AppState>,
    Json(req): Json<GetSaltRequest>,
) -> Result<Json<GetSaltResponse>, ServerError> {
    let user = {
        let conn = state.storage.conn()?;
        users::find_by_username(&conn, &req.username)?
    };

    let salt = match user {
        Some(user) => user.salt,
        None => generate_salt().to_vec(),
    };
    Ok(Json(GetSaltResponse { salt }))
}

/// Compare the candidate verifier and issue a token pair.
///
/// Unknown users, wrong verifiers and lookup failures all answer the same
/// `Unauthorized`.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ServerError> {
    let rejected = || ServerError::Unauthorized("Invalid credentials".to_string());

    let lookup = {
        let conn = state.storage.conn()?;
        users::find_by_username(&conn, &req.username)
    };
    let user = lookup.unwrap_or_else(|e| {
        warn!("Login lookup failed: {}", e);
        None
    });

    let matched = match &user {
        Some(user) => verify_verifier(&user.verifier, &req.verifier),
        None => {
            // Same comparison work for absent users
            let _ = verify_verifier(&[0u8; 32], &req.verifier);
            false
        }
    };
    let user = user.filter(|_| matched).ok_or_else(rejected)?;

    let pair = {
        let conn = state.storage.conn()?;
        state.tokens.issue_pair(&conn, user.id)?
    };

    info!("User {} logged in", user.id);
    Ok(Json(pair))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, ServerError> {
    let mut conn = state.storage.conn()?;
    let pair = state.tokens.rotate(&mut conn, &req.refresh_token)?;
    Ok(Json(pair))
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::test_state;

    fn register_request(username: &str, verifier: u8) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            username: username.to_string(),
            salt: vec![3; 16],
            verifier: vec![verifier; 32],
        })
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (state, _dir) = test_state();
        register(State(state.clone()), register_request("alice", 7))
            .await
            .unwrap();

        let Json(pair) = login(
            State(state.clone()),
            Json(LoginRequest {
                username: "alice".to_string(),
                verifier: vec![7; 32],
            }),
        )
        .await
        .unwrap();
        assert!(state.tokens.verify_access_token(&pair.access_token).is_ok());

        let Json(rotated) = refresh_token(
            State(state.clone()),
            Json(RefreshTokenRequest {
                refresh_token: pair.refresh_token,
            }),
        )
        .await
        .unwrap();
        assert!(state.tokens.verify_access_token(&rotated.access_token).is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (state, _dir) = test_state();
        register(State(state.clone()), register_request("alice", 7))
            .await
            .unwrap();
        let err = register(State(state), register_request("alice", 8))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_login_failures_look_alike() {
        let (state, _dir) = test_state();
        register(State(state.clone()), register_request("alice", 7))
            .await
            .unwrap();

        for (username, verifier) in [("alice", vec![8; 32]), ("nobody", vec![7; 32]), ("alice", vec![])] {
            let err = login(
                State(state.clone()),
                Json(LoginRequest {
                    username: username.to_string(),
                    verifier,
                }),
            )
            .await
            .unwrap_err();
            assert_eq!(err.to_string(), "Unauthorized: Invalid credentials");
        }
    }

    #[tokio::test]
    async fn test_unknown_user_gets_random_salt() {
        let (state, _dir) = test_state();
        register(State(state.clone()), register_request("alice", 7))
            .await
            .unwrap();

        let salt_of = |name: &str| {
            get_salt(
                State(state.clone()),
                Json(GetSaltRequest {
                    username: name.to_string(),
                }),
            )
        };

        let Json(known) = salt_of("alice").await.unwrap();
        assert_eq!(known.salt, vec![3; 16]);

        let Json(first) = salt_of("nobody").await.unwrap();
        let Json(second) = salt_of("nobody").await.unwrap();
        assert_eq!(first.salt.len(), known.salt.len());
        assert_ne!(first.salt, second.salt);
    }

    #[tokio::test]
    async fn test_empty_username_rejected() {
        let (state, _dir) = test_state();
        let err = register(State(state), register_request("  ", 7))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }
}
