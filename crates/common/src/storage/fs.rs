use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{content_cid, ContentStore, Locator, StorageError};

/// Content-addressed files under a root directory
///
/// Each blob lives at `root/<cid>` where the CID is CIDv1 raw + sha2-256 of
/// the blob, so locators are interchangeable with an IPFS node holding the
/// same bytes as raw blocks.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, locator: &Locator) -> Result<PathBuf, StorageError> {
        // only well-formed CIDs, so a locator can never escape the root
        let cid = locator.to_cid()?;
        Ok(self.root.join(cid.to_string()))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    async fn store(&self, content: Bytes) -> Result<Locator, StorageError> {
        let locator = Locator::from(content_cid(&content)?);
        let path = self.path_for(&locator)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(locator);
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut file = tempfile::NamedTempFile::new_in(&root)?;
            file.write_all(&content)?;
            file.as_file().sync_all()?;
            file.persist(&path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        tracing::debug!(%locator, "stored blob");
        Ok(locator)
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes, StorageError> {
        let path = self.path_for(locator)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(locator.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_fetch_by_cid() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::open(dir.path().join("blobs")).unwrap();

        let locator = store.store(Bytes::from_static(b"hello-world")).await.unwrap();
        assert_eq!(
            locator,
            Locator::from(content_cid(b"hello-world").unwrap())
        );
        assert!(store.root().join(locator.as_str()).exists());
        assert_eq!(store.fetch(&locator).await.unwrap(), &b"hello-world"[..]);

        // idempotent
        let again = store.store(Bytes::from_static(b"hello-world")).await.unwrap();
        assert_eq!(again, locator);
    }

    #[tokio::test]
    async fn test_fetch_missing_and_invalid() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::open(dir.path()).unwrap();

        let missing = Locator::from(content_cid(b"never stored").unwrap());
        assert!(matches!(
            store.fetch(&missing).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.fetch(&Locator::new("../../etc/passwd")).await,
            Err(StorageError::InvalidLocator(_))
        ));
    }

    #[tokio::test]
    async fn test_reopen_sees_existing_blobs() {
        let dir = TempDir::new().unwrap();
        let locator = FsContentStore::open(dir.path())
            .unwrap()
            .store(Bytes::from_static(b"persisted"))
            .await
            .unwrap();

        let reopened = FsContentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.fetch(&locator).await.unwrap(), &b"persisted"[..]);
    }
}
