use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

pub use file::FileStore;

mod file;

/// String blobs addressed by name.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, name: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, name: &str, value: &str) -> Result<(), StorageError>;

    async fn remove_item(&self, name: &str) -> Result<(), StorageError>;
}

/// Process-local store, nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(name).cloned())
    }

    async fn set_item(&self, name: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, name: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(name);
        Ok(())
    }
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn get_item(&self, name: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(name).await
    }

    async fn set_item(&self, name: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(name, value).await
    }

    async fn remove_item(&self, name: &str) -> Result<(), StorageError> {
        (**self).remove_item(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_item("chat").await.unwrap(), None);

        store.set_item("chat", "{}").await.unwrap();
        assert_eq!(store.get_item("chat").await.unwrap().as_deref(), Some("{}"));

        store.remove_item("chat").await.unwrap();
        assert_eq!(store.get_item("chat").await.unwrap(), None);
    }
}
