//! In-memory key-value store for testing and embedding

use crate::error::{Result, StoreError};
use crate::KvStore;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// An in-memory key-value store
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<DashMap<Vec<u8>, Bytes>>,
}

impl MemoryKvStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Get the number of entries stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get total size of all stored values
    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.value().len() as u64)
            .sum()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &[u8]) -> Result<Bytes> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(hex::encode(key)))
    }

    async fn put(&self, key: &[u8], value: Bytes) -> Result<()> {
        self.entries.insert(key.to_vec(), value);
        Ok(())
    }

    async fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryKvStore::new();

        store.put(b"alpha", Bytes::from_static(b"1")).await.unwrap();

        assert!(store.contains(b"alpha").await.unwrap());
        assert_eq!(store.get(b"alpha").await.unwrap().as_ref(), b"1");
    }

    #[tokio::test]
    async fn test_memory_store_not_found() {
        let store = MemoryKvStore::new();

        let result = store.get(b"missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!store.contains(b"missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_overwrite() {
        let store = MemoryKvStore::new();

        store.put(b"k", Bytes::from_static(b"old")).await.unwrap();
        store.put(b"k", Bytes::from_static(b"new")).await.unwrap();

        assert_eq!(store.get(b"k").await.unwrap().as_ref(), b"new");
        assert_eq!(store.len(), 1);
    }
}
