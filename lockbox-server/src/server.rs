//! Axum router setup.

use crate::auth::auth_middleware;
use crate::cleanup;
use crate::config::ServerConfig;
use crate::handlers::{account, files, sync};
use crate::objects::{self, LocalObjectStore, ObjectStore};
use crate::storage::ServerStorage;
use crate::tokens::TokenService;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use lockbox_core::rpc::RpcMethod;
use rand::RngCore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub storage: ServerStorage,
    pub tokens: Arc<TokenService>,
    pub objects: Arc<dyn ObjectStore>,
}

pub fn build_router(
    state: AppState,
    object_store: Arc<LocalObjectStore>,
    config: &ServerConfig,
) -> Router {
    // Authenticated routes
    let authenticated = Router::new()
        .route(&RpcMethod::AddEntry.path(), post(sync::add_entry))
        .route(&RpcMethod::Sync.path(), post(sync::sync))
        .route(&RpcMethod::MarkUploaded.path(), post(files::mark_uploaded))
        .route(&RpcMethod::GetPresignedPutUrl.path(), post(files::presigned_put_url))
        .route(&RpcMethod::GetPresignedGetUrl.path(), post(files::presigned_get_url))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Unauthenticated routes
    let public = Router::new()
        .route(&RpcMethod::RegisterUser.path(), post(account::register))
        .route(&RpcMethod::GetSalt.path(), post(account::get_salt))
        .route(&RpcMethod::Login.path(), post(account::login))
        .route(&RpcMethod::RefreshToken.path(), post(account::refresh_token))
        .route(&RpcMethod::Ping.path(), post(account::ping))
        .route("/health", get(health));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .nest_service("/objects", objects::router(object_store))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn token_secret(config: &ServerConfig) -> Vec<u8> {
    match config.token_secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
        _ => {
            warn!("No token secret configured; tokens and URLs will not survive a restart");
            let mut secret = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            secret
        }
    }
}

/// A wired application: the router plus the storage it runs on.
pub struct App {
    pub router: Router,
    pub storage: ServerStorage,
}

pub fn build_app(config: &ServerConfig) -> anyhow::Result<App> {
    let storage = ServerStorage::open(&config.database_path)?;
    let secret = token_secret(config);

    let tokens = Arc::new(TokenService::new(
        &secret,
        config.access_token_ttl(),
        config.refresh_token_ttl(),
    ));
    let object_store = Arc::new(LocalObjectStore::new(
        config.storage_dir.clone(),
        &config.public_url,
        &secret,
        config.presign_ttl(),
    )?);

    let state = AppState {
        storage: storage.clone(),
        tokens,
        objects: object_store.clone(),
    };
    Ok(App {
        router: build_router(state, object_store, config),
        storage,
    })
}

/// Serve on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> anyhow::Result<()> {
    let app = build_app(&config)?;
    let cleanup = cleanup::spawn_cleanup_task(app.storage.clone(), config.cleanup_interval());

    info!("Listening on {}", listener.local_addr()?);
    let result = axum::serve(listener, app.router).await;
    cleanup.abort();
    result?;
    Ok(())
}
