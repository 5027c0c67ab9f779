//! Storage Abstractions
//!
//! Simple keyed string storage, the equivalent of a browser's `localStorage`.
//! Collaborator stores (likes, playlists, equalizer, imported songs) persist
//! JSON documents under fixed keys through this trait.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Platform implementations:
/// - **Desktop**: SQLite table (`bridge-desktop::SqliteSettingsStore`)
/// - **Tests / ephemeral hosts**: in-memory map (`bridge-desktop::MemorySettingsStore`)
/// - **Web**: `localStorage`
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_likes(store: &dyn SettingsStore, json: &str) -> Result<()> {
///     store.set_string("melodia_liked_songs", json).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value, replacing any previous value under `key`
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all keys, sorted
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Store {}

        #[async_trait]
        impl SettingsStore for Store {
            async fn set_string(&self, key: &str, value: &str) -> Result<()>;
            async fn get_string(&self, key: &str) -> Result<Option<String>>;
            async fn delete(&self, key: &str) -> Result<()>;
            async fn list_keys(&self) -> Result<Vec<String>>;
            async fn clear_all(&self) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn test_has_key_uses_get_string() {
        let mut store = MockStore::new();
        store
            .expect_get_string()
            .withf(|key| key == "present")
            .returning(|_| Ok(Some("[]".to_string())));
        store
            .expect_get_string()
            .withf(|key| key == "absent")
            .returning(|_| Ok(None));

        assert!(store.has_key("present").await.unwrap());
        assert!(!store.has_key("absent").await.unwrap());
    }
}
