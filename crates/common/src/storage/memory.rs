use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{content_cid, ContentStore, Locator, StorageError};

/// In-memory content store keyed by raw CIDv1
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<RwLock<HashMap<Locator, Bytes>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Replace the bytes behind an existing locator, simulating a tampered store
    pub fn overwrite(&self, locator: &Locator, content: Bytes) {
        self.inner.write().insert(locator.clone(), content);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn store(&self, content: Bytes) -> Result<Locator, StorageError> {
        let locator = Locator::from(content_cid(&content)?);
        self.inner.write().insert(locator.clone(), content);
        Ok(locator)
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes, StorageError> {
        self.inner
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(locator.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_store_fetch() {
        let store = MemoryContentStore::new();
        let locator = store.store(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(store.fetch(&locator).await.unwrap(), &b"hello"[..]);

        // same content, same locator
        let again = store.store(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(locator, again);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let store = MemoryContentStore::new();
        let result = store.fetch(&Locator::new("bafkmissing")).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = MemoryContentStore::new();
        let locator = store.store(Bytes::from_static(b"original")).await.unwrap();
        store.overwrite(&locator, Bytes::from_static(b"tampered"));
        assert_eq!(store.fetch(&locator).await.unwrap(), &b"tampered"[..]);
    }
}
