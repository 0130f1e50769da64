//! Lockbox Server
//!
//! A self-hostable server of record for the lockbox vault. It stores only
//! a password-derived verifier per user and opaque ciphertexts; it never
//! holds encryption keys or plaintext.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod objects;
pub mod server;
pub mod storage;
pub mod sync;
pub mod tokens;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{build_app, serve, App, AppState};
