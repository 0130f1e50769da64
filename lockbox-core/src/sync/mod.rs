//! Client side of the version-based sync protocol.
//!
//! - Pushes every pending entry and staged file with the local checkpoint
//! - Applies server-assigned versions and other devices' changes
//! - Uploads staged file ciphertext to presigned URLs
//! - Advances the checkpoint only after the whole cycle succeeded

pub mod engine;
pub mod transfer;

pub use engine::{SyncEngine, SyncReport};
#[cfg(feature = "sync")]
pub use transfer::HttpBlobTransfer;
pub use transfer::BlobTransfer;
