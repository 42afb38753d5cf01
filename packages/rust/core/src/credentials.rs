//! Gemini API key kept in the shared store next to the highlights.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use glean_shared::{CREDENTIAL_KEY, GleanError, Result};
use glean_storage::{KvStore, StoreMap};

/// Read/write access to the stored API key.
pub struct CredentialStore<S> {
    store: Arc<S>,
}

impl<S> Clone for CredentialStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KvStore> CredentialStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The stored key, if one is set and non-blank.
    pub async fn get(&self) -> Result<Option<String>> {
        let mut found = self.store.get(&[CREDENTIAL_KEY]).await?;
        Ok(match found.remove(CREDENTIAL_KEY) {
            Some(Value::String(key)) if !key.trim().is_empty() => Some(key),
            _ => None,
        })
    }

    /// Store `key` after trimming surrounding whitespace.
    pub async fn set(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(GleanError::validation("API key is empty"));
        }
        self.store
            .set(StoreMap::from([(
                CREDENTIAL_KEY.to_owned(),
                Value::String(key.to_owned()),
            )]))
            .await?;
        info!("API key saved");
        Ok(())
    }

    pub async fn remove(&self) -> Result<()> {
        self.store.remove(&[CREDENTIAL_KEY]).await?;
        info!("API key removed");
        Ok(())
    }

    pub async fn is_configured(&self) -> Result<bool> {
        Ok(self.get().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glean_shared::HIGHLIGHTS_KEY;
    use glean_storage::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn set_trims_and_get_returns_key() {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()));
        assert!(!creds.is_configured().await.unwrap());

        creds.set("  AIza-test-key \n").await.unwrap();
        assert_eq!(creds.get().await.unwrap().as_deref(), Some("AIza-test-key"));
        assert!(creds.is_configured().await.unwrap());
    }

    #[tokio::test]
    async fn blank_key_rejected() {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            creds.set("   ").await,
            Err(GleanError::Validation { .. })
        ));
        assert!(creds.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_leaves_highlights_alone() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(StoreMap::from([(HIGHLIGHTS_KEY.to_owned(), json!([]))]))
            .await
            .unwrap();
        let creds = CredentialStore::new(store.clone());
        creds.set("k").await.unwrap();

        creds.remove().await.unwrap();
        assert!(creds.get().await.unwrap().is_none());
        assert!(store.get(&[HIGHLIGHTS_KEY]).await.unwrap().contains_key(HIGHLIGHTS_KEY));
    }
}
