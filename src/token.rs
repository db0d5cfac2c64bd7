//! Bearer token storage.
//!
//! The session never caches a token: it asks its [`TokenStore`] on every
//! connect, publish and subscribe, so a token refreshed elsewhere is picked
//! up by the next operation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Synchronous source of bearer tokens.
pub trait TokenStore: Send + Sync {
    /// Returns the token stored under `key`, or an empty string when absent.
    fn token(&self, key: &str) -> String;
}

/// In-memory token store that can be updated at runtime.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `token` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, token: impl Into<String>) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), token.into());
    }

    /// Removes the token stored under `key`.
    pub fn remove(&self, key: &str) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self, key: &str) -> String {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

/// Reads tokens from environment variables named after the upper-cased key
/// (`jwt` → `JWT`). The variable is read on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvTokenStore;

impl EnvTokenStore {
    /// Creates the store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TokenStore for EnvTokenStore {
    fn token(&self, key: &str) -> String {
        std::env::var(key.to_ascii_uppercase()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_empty() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.token("jwt"), "");
    }

    #[test]
    fn set_replaces_and_remove_clears() {
        let store = MemoryTokenStore::new();
        store.set("jwt", "first");
        store.set("jwt", "second");
        assert_eq!(store.token("jwt"), "second");
        store.remove("jwt");
        assert_eq!(store.token("jwt"), "");
    }

    #[test]
    fn env_store_reads_missing_variable_as_empty() {
        let store = EnvTokenStore::new();
        assert_eq!(store.token("doguin_client_test_token_that_is_never_set"), "");
    }
}
