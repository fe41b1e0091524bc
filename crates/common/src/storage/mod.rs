//! Content storage collaborators
//!
//! The integrity core only needs two things from storage: put bytes in and get
//! an opaque [`Locator`] back, and get the same bytes out again for a locator.
//! Adapters:
//!
//! - [`IpfsClient`]: the IPFS HTTP API (`/add`, `/cat`)
//! - [`FsContentStore`]: content-addressed files on local disk
//! - [`MemoryContentStore`]: a map, for tests and dry runs

mod fs;
mod ipfs;
mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Categorize, ErrorKind};

pub use fs::FsContentStore;
pub use ipfs::{IpfsClient, DEFAULT_IPFS_API, IPFS_REQUEST_TIMEOUT};
pub use memory::MemoryContentStore;

/// Multicodec code for raw bytes
pub const RAW_CODEC: u64 = 0x55;
/// Multihash code for sha2-256
pub const SHA2_256_CODE: u64 = 0x12;

/// Opaque address of stored content (an IPFS CID for the bundled adapters)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the locator as a CID
    pub fn to_cid(&self) -> Result<Cid, StorageError> {
        Cid::try_from(self.0.as_str())
            .map_err(|e| StorageError::InvalidLocator(format!("{}: {}", self.0, e)))
    }
}

impl From<Cid> for Locator {
    fn from(cid: Cid) -> Self {
        Self(cid.to_string())
    }
}

impl From<String> for Locator {
    fn from(locator: String) -> Self {
        Self(locator)
    }
}

impl From<&str> for Locator {
    fn from(locator: &str) -> Self {
        Self(locator.to_string())
    }
}

impl std::str::FromStr for Locator {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({})", self.0)
    }
}

/// CIDv1 (raw codec, sha2-256) addressing `content`
pub fn content_cid(content: &[u8]) -> Result<Cid, StorageError> {
    let digest = Sha256::digest(content);
    let multihash = multihash::Multihash::<64>::wrap(SHA2_256_CODE, &digest)
        .map_err(|e| StorageError::InvalidLocator(e.to_string()))?;
    Ok(Cid::new_v1(RAW_CODEC, multihash))
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("content not found: {0}")]
    NotFound(Locator),
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error("storage backend returned {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("unexpected storage response: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Connection failures, timeouts and 5xx responses
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl Categorize for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) | StorageError::InvalidLocator(_) => ErrorKind::NotFound,
            _ => ErrorKind::Io,
        }
    }
}

/// A content-addressed blob store
///
/// `fetch(store(x))` must return exactly `x`. Locators are opaque to callers.
#[async_trait]
pub trait ContentStore: Send + Sync + fmt::Debug {
    /// Persist `content`, returning its locator
    async fn store(&self, content: Bytes) -> Result<Locator, StorageError>;

    /// Retrieve the bytes stored under `locator`
    async fn fetch(&self, locator: &Locator) -> Result<Bytes, StorageError>;
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn store(&self, content: Bytes) -> Result<Locator, StorageError> {
        (**self).store(content).await
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes, StorageError> {
        (**self).fetch(locator).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_content_cid_is_stable_raw_v1() {
        let cid = content_cid(b"hello-world").unwrap();
        assert_eq!(cid.version(), cid::Version::V1);
        assert_eq!(cid.codec(), RAW_CODEC);
        assert_eq!(cid.hash().code(), SHA2_256_CODE);
        assert_eq!(cid, content_cid(b"hello-world").unwrap());
        assert_ne!(cid, content_cid(b"hello-w0rld").unwrap());

        let locator = Locator::from(cid);
        assert_eq!(locator.to_cid().unwrap(), cid);
    }

    #[test]
    fn test_invalid_locator() {
        let locator = Locator::new("not-a-cid");
        assert!(matches!(
            locator.to_cid(),
            Err(StorageError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Unavailable("refused".into()).is_transient());
        assert!(StorageError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!StorageError::HttpStatus {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!StorageError::NotFound(Locator::new("x")).is_transient());
        assert_eq!(
            StorageError::NotFound(Locator::new("x")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(StorageError::Unavailable("x".into()).kind(), ErrorKind::Io);
    }
}
