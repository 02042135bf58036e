//! Token verification.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Resolves a bearer token to a user ID.
///
/// Token issuance lives in the auth service; this is the gateway's view of
/// it. `Ok(None)` means the token is unknown or expired. The in-memory
/// implementation below backs development and tests.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Option<String>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTokens {
    tokens: Mutex<HashMap<String, String>>,
}

impl MemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(token, user_id)` pairs.
    pub fn seeded(pairs: &[(String, String)]) -> Self {
        let store = Self::new();
        for (token, user_id) in pairs {
            store.insert(token, user_id);
        }
        store
    }

    pub fn insert(&self, token: &str, user_id: &str) {
        self.tokens
            .lock()
            .insert(token.to_string(), user_id.to_string());
    }

    pub fn remove(&self, token: &str) {
        self.tokens.lock().remove(token);
    }
}

#[async_trait]
impl TokenStore for MemoryTokens {
    async fn verify(&self, token: &str) -> Result<Option<String>, ApiError> {
        Ok(self.tokens.lock().get(token).cloned())
    }
}
