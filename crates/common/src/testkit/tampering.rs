use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;

use crate::storage::{ContentStore, Locator, StorageError};

/// How fetched bytes are altered
#[derive(Debug, Clone)]
pub enum Tamper {
    /// Serve these bytes instead
    Replace(Bytes),
    /// Flip every bit of the byte at this offset (the last byte if out of range)
    FlipByte(usize),
    /// Report the backend as unreachable
    Unavailable,
}

/// Content store wrapper that corrupts chosen locators on fetch
///
/// Stores pass straight through; the inner store is never modified.
#[derive(Debug, Clone)]
pub struct TamperingStore {
    inner: Arc<dyn ContentStore>,
    tampered: Arc<RwLock<HashMap<Locator, Tamper>>>,
}

impl TamperingStore {
    pub fn new(inner: Arc<dyn ContentStore>) -> Self {
        Self {
            inner,
            tampered: Arc::default(),
        }
    }

    pub fn tamper(&self, locator: &Locator, tamper: Tamper) {
        self.tampered.write().insert(locator.clone(), tamper);
    }

    pub fn restore(&self, locator: &Locator) {
        self.tampered.write().remove(locator);
    }
}

#[async_trait]
impl ContentStore for TamperingStore {
    async fn store(&self, content: Bytes) -> Result<Locator, StorageError> {
        self.inner.store(content).await
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes, StorageError> {
        let tamper = self.tampered.read().get(locator).cloned();
        match tamper {
            None => self.inner.fetch(locator).await,
            Some(Tamper::Replace(bytes)) => Ok(bytes),
            Some(Tamper::Unavailable) => Err(StorageError::Unavailable(format!(
                "{} is unreachable",
                locator
            ))),
            Some(Tamper::FlipByte(offset)) => {
                let original = self.inner.fetch(locator).await?;
                if original.is_empty() {
                    return Ok(Bytes::from_static(&[0xff]));
                }
                let mut bytes = BytesMut::from(&original[..]);
                let offset = offset.min(bytes.len() - 1);
                bytes[offset] ^= 0xff;
                Ok(bytes.freeze())
            }
        }
    }
}
