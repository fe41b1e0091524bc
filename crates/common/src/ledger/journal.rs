use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::memory::Chain;
use super::{Claim, Ledger, LedgerError, LedgerRecord, RegistrationClaim};
use crate::crypto::Fingerprint;

/// Hash-chained JSON-lines journal on local disk
///
/// One [`LedgerRecord`] per line. The first line is the genesis record written
/// by [`deploy`](Self::deploy); its reference identifies the deployment. The
/// whole chain is re-verified on [`open`](Self::open).
#[derive(Debug, Clone)]
pub struct JournalLedger {
    path: PathBuf,
    chain: Arc<Mutex<Chain>>,
}

impl JournalLedger {
    /// Provision a new journal at `path` with a genesis record
    pub async fn deploy(path: impl Into<PathBuf>, label: &str) -> Result<Self, LedgerError> {
        let path = path.into();
        if tokio::fs::try_exists(&path).await? {
            return Err(LedgerError::AlreadyDeployed(path.display().to_string()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let ledger = Self {
            path,
            chain: Arc::new(Mutex::new(Chain::default())),
        };
        let genesis = ledger
            .append(Claim::Genesis {
                label: label.to_string(),
            })
            .await?;
        tracing::info!(reference = %genesis.reference, path = %ledger.path.display(), "deployed ledger journal");
        Ok(ledger)
    }

    /// Open an existing journal, verifying its hash chain
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LedgerError::NotDeployed(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: LedgerRecord =
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            records.push(record);
        }
        let chain = Chain::from_records(records)?;
        tracing::debug!(records = chain.len(), path = %path.display(), "opened ledger journal");

        Ok(Self {
            path,
            chain: Arc::new(Mutex::new(chain)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The genesis record identifying this deployment
    pub async fn genesis(&self) -> Option<LedgerRecord> {
        self.chain.lock().await.first().cloned()
    }

    async fn append(&self, claim: Claim) -> Result<LedgerRecord, LedgerError> {
        let mut chain = self.chain.lock().await;
        let record = chain.next(claim)?;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;

        chain.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl Ledger for JournalLedger {
    #[tracing::instrument(skip(self, claim), fields(fingerprint = %claim.fingerprint))]
    async fn submit_registration(
        &self,
        claim: RegistrationClaim,
    ) -> Result<LedgerRecord, LedgerError> {
        self.append(Claim::Registration(claim)).await
    }

    async fn submit_verification(
        &self,
        fingerprint: Fingerprint,
        verified: bool,
    ) -> Result<LedgerRecord, LedgerError> {
        self.append(Claim::Verification {
            fingerprint,
            verified,
        })
        .await
    }

    async fn registration(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.chain.lock().await.registration(fingerprint))
    }

    async fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self.chain.lock().await.history(fingerprint))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::hash;
    use crate::storage::Locator;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_deploy_writes_genesis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = JournalLedger::deploy(&path, "qdv").await.unwrap();

        let genesis = ledger.genesis().await.unwrap();
        assert!(matches!(genesis.claim, Claim::Genesis { .. }));
        assert!(genesis.reference.as_str().starts_with("0x"));

        assert!(matches!(
            JournalLedger::deploy(&path, "qdv").await,
            Err(LedgerError::AlreadyDeployed(_))
        ));
    }

    #[tokio::test]
    async fn test_open_missing_is_not_deployed() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            JournalLedger::open(dir.path().join("ledger.jsonl")).await,
            Err(LedgerError::NotDeployed(_))
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let fingerprint = hash(b"doc");

        let ledger = JournalLedger::deploy(&path, "qdv").await.unwrap();
        let registered = ledger
            .submit_registration(RegistrationClaim::new(fingerprint, Locator::new("bafk")))
            .await
            .unwrap();
        drop(ledger);

        let reopened = JournalLedger::open(&path).await.unwrap();
        assert_eq!(
            reopened.registration(&fingerprint).await.unwrap(),
            Some(registered.clone())
        );

        let verified = reopened.submit_verification(fingerprint, true).await.unwrap();
        assert_eq!(verified.previous, Some(registered.reference));
        assert_eq!(reopened.history(&fingerprint).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tampered_journal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = JournalLedger::deploy(&path, "qdv").await.unwrap();
        ledger
            .submit_verification(hash(b"doc"), false)
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.replace("\"verified\":false", "\"verified\":true")).unwrap();

        assert!(matches!(
            JournalLedger::open(&path).await,
            Err(LedgerError::Corrupt { line: 2, .. })
        ));
    }
}
