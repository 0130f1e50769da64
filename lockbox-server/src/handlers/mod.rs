//! RPC handlers, one module per concern.

pub mod account;
pub mod files;
pub mod sync;
