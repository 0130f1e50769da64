//! Token state owned by the RPC client.

use crate::rpc::models::TokenPair;
use std::sync::{Arc, RwLock};

/// Current access/refresh token pair, shared between clones of a client
#[derive(Clone, Default)]
pub struct Session {
    tokens: Arc<RwLock<Option<TokenPair>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pair: TokenPair) {
        let mut guard = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(pair);
    }

    pub fn clear(&self) {
        let mut guard = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn access_token(&self) -> Option<String> {
        let guard = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        let guard = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|p| p.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
