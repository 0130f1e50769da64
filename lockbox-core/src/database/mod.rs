//! Local cache store.
//!
//! Holds encrypted entries, encrypted file records and a small key-value
//! metadata table (cached credentials, sync checkpoint). Query helpers are
//! free functions over `&Connection` so they compose inside transactions.

pub mod entries;
pub mod files;
pub mod meta;
pub mod models;
pub mod schema;

pub use meta::CachedCredentials;
pub use models::{LocalEntry, LocalFile, UploadStatus};
pub use schema::Database;
