//! File upload bookkeeping and presigned URL handlers.

use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::server::AppState;
use crate::storage::records;
use crate::sync as sync_service;
use axum::extract::State;
use axum::{Extension, Json};
use lockbox_core::rpc::models::{
    Empty, MarkUploadedRequest, PresignedGetRequest, PresignedGetResponse, PresignedPutResponse,
};
use tracing::debug;
use uuid::Uuid;

pub async fn mark_uploaded(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<MarkUploadedRequest>,
) -> Result<Json<Empty>, ServerError> {
    let version = {
        let mut conn = state.storage.conn()?;
        sync_service::mark_uploaded(&mut conn, user_id, req.entry_id)?
    };
    debug!("File {} uploaded at version {}", req.entry_id, version);
    Ok(Json(Empty {}))
}

/// A fresh storage key with an upload URL, not tied to any file row.
pub async fn presigned_put_url(
    State(state): State<AppState>,
    Extension(AuthUser(_)): Extension<AuthUser>,
) -> Result<Json<PresignedPutResponse>, ServerError> {
    let storage_key = Uuid::new_v4().to_string();
    let url = state.objects.presign_put(&storage_key).await?;
    Ok(Json(PresignedPutResponse { storage_key, url }))
}

pub async fn presigned_get_url(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<PresignedGetRequest>,
) -> Result<Json<PresignedGetResponse>, ServerError> {
    let storage_key = {
        let conn = state.storage.conn()?;
        records::storage_key(&conn, user_id, req.entry_id)?
    };
    let url = state.objects.presign_get(&storage_key).await?;
    Ok(Json(PresignedGetResponse { url }))
}
