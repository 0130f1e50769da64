//! Sync and AddEntry handlers.

use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::server::AppState;
use crate::sync as sync_service;
use axum::extract::State;
use axum::{Extension, Json};
use lockbox_core::rpc::models::{AddEntryRequest, AddEntryResponse, SyncRequest, SyncResponse};
use tracing::info;

pub async fn sync(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ServerError> {
    let staged = sync_service::stage_uploads(state.objects.as_ref(), req.files).await?;

    let resp = {
        let mut conn = state.storage.conn()?;
        sync_service::apply(&mut conn, user_id, req.checkpoint, req.entries, staged)?
    };

    info!(
        "Sync for user {}: max version {}, {} upload tasks",
        user_id,
        resp.max_version,
        resp.upload_tasks.len()
    );
    Ok(Json(resp))
}

pub async fn add_entry(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<AddEntryRequest>,
) -> Result<Json<AddEntryResponse>, ServerError> {
    let mut conn = state.storage.conn()?;
    let version = sync_service::add_entry(&mut conn, user_id, req.entry)?;
    Ok(Json(AddEntryResponse { version }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ObjectStore;
    use crate::server::tests::test_state;
    use crate::storage::{records, users};
    use async_trait::async_trait;
    use lockbox_core::database::UploadStatus;
    use lockbox_core::rpc::models::{EntryBlob, FileBlob};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Unreachable;

    #[async_trait]
    impl ObjectStore for Unreachable {
        async fn presign_put(&self, _storage_key: &str) -> Result<String, ServerError> {
            Err(ServerError::Storage("connection refused".to_string()))
        }

        async fn presign_get(&self, _storage_key: &str) -> Result<String, ServerError> {
            Err(ServerError::Storage("connection refused".to_string()))
        }
    }

    fn entry() -> EntryBlob {
        EntryBlob {
            id: Uuid::new_v4(),
            version: 0,
            overview: vec![1; 8],
            overview_nonce: vec![0; 12],
            details: vec![2; 16],
            details_nonce: vec![0; 12],
            deleted: false,
        }
    }

    #[tokio::test]
    async fn test_presign_failure_aborts_before_writes() {
        let (mut state, _dir) = test_state();
        let unreachable: Arc<dyn ObjectStore> = Arc::new(Unreachable);
        state.objects = unreachable;
        let alice = {
            let conn = state.storage.conn().unwrap();
            users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap()
        };

        let note = entry();
        let req = SyncRequest {
            entries: vec![note.clone()],
            files: vec![FileBlob {
                entry_id: note.id,
                version: 0,
                encrypted_key: vec![3; 48],
                key_nonce: vec![4; 12],
                storage_key: None,
                upload_status: UploadStatus::Pending,
                deleted: false,
            }],
            checkpoint: 0,
        };

        let err = sync(State(state.clone()), Extension(AuthUser(alice)), Json(req))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Storage(_)));
        assert_eq!(err.code(), lockbox_core::rpc::RpcCode::Internal);

        let conn = state.storage.conn().unwrap();
        assert!(records::get_entry(&conn, alice, note.id).unwrap().is_none());
        assert_eq!(users::current_version(&conn, alice).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_entry_returns_version() {
        let (state, _dir) = test_state();
        let alice = {
            let conn = state.storage.conn().unwrap();
            users::insert(&conn, "alice", &[1; 16], &[2; 32]).unwrap()
        };

        let Json(first) = add_entry(
            State(state.clone()),
            Extension(AuthUser(alice)),
            Json(AddEntryRequest { entry: entry() }),
        )
        .await
        .unwrap();
        let Json(second) = add_entry(
            State(state.clone()),
            Extension(AuthUser(alice)),
            Json(AddEntryRequest { entry: entry() }),
        )
        .await
        .unwrap();
        assert_eq!((first.version, second.version), (1, 2));

        let Json(resp) = sync(
            State(state),
            Extension(AuthUser(alice)),
            Json(SyncRequest::default()),
        )
        .await
        .unwrap();
        assert_eq!(resp.other_entries.len(), 2);
        assert_eq!(resp.max_version, 0);
    }
}
