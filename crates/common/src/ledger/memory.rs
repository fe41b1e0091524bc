use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{chain_reference, Claim, Ledger, LedgerError, LedgerRecord, LedgerReference, RegistrationClaim};
use crate::crypto::Fingerprint;

/// An ordered, hash-linked list of ledger records
#[derive(Debug, Default, Clone)]
pub(crate) struct Chain {
    records: Vec<LedgerRecord>,
}

impl Chain {
    /// Rebuild a chain, checking every link
    pub(crate) fn from_records(records: Vec<LedgerRecord>) -> Result<Self, LedgerError> {
        let mut previous: Option<&LedgerReference> = None;
        for (index, record) in records.iter().enumerate() {
            if record.previous.as_ref() != previous {
                return Err(LedgerError::Corrupt {
                    line: index + 1,
                    reason: "broken previous link".to_string(),
                });
            }
            if chain_reference(previous, &record.claim)? != record.reference {
                return Err(LedgerError::Corrupt {
                    line: index + 1,
                    reason: "reference does not match claim".to_string(),
                });
            }
            previous = Some(&record.reference);
        }
        Ok(Self { records })
    }

    pub(crate) fn head(&self) -> Option<&LedgerReference> {
        self.records.last().map(|record| &record.reference)
    }

    pub(crate) fn first(&self) -> Option<&LedgerRecord> {
        self.records.first()
    }

    /// The record `claim` would become if appended now
    pub(crate) fn next(&self, claim: Claim) -> Result<LedgerRecord, LedgerError> {
        LedgerRecord::chain(self.head(), claim)
    }

    pub(crate) fn push(&mut self, record: LedgerRecord) {
        self.records.push(record);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn registration(&self, fingerprint: &Fingerprint) -> Option<LedgerRecord> {
        self.records
            .iter()
            .find(|record| matches!(&record.claim, Claim::Registration(claim) if &claim.fingerprint == fingerprint))
            .cloned()
    }

    pub(crate) fn history(&self, fingerprint: &Fingerprint) -> Vec<LedgerRecord> {
        self.records
            .iter()
            .filter(|record| record.claim.fingerprint() == Some(fingerprint))
            .cloned()
            .collect()
    }
}

/// In-memory ledger with the same hash chaining as the journal
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Chain>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&self, claim: Claim) -> Result<LedgerRecord, LedgerError> {
        let mut chain = self.inner.lock();
        let record = chain.next(claim)?;
        chain.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit_registration(
        &self,
        claim: RegistrationClaim,
    ) -> Result<LedgerRecord, LedgerError> {
        self.append(Claim::Registration(claim))
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
    }

    async fn registration(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.inner.lock().registration(fingerprint))
    }

    async fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self.inner.lock().history(fingerprint))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::hash;
    use crate::storage::Locator;

    #[tokio::test]
    async fn test_records_are_chained() {
        let ledger = MemoryLedger::new();
        let fingerprint = hash(b"doc");

        let first = ledger
            .submit_registration(RegistrationClaim::new(fingerprint, Locator::new("bafk")))
            .await
            .unwrap();
        let second = ledger.submit_verification(fingerprint, true).await.unwrap();

        assert_eq!(first.previous, None);
        assert_eq!(second.previous.as_ref(), Some(&first.reference));
        assert_ne!(first.reference, second.reference);
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_registration_and_history() {
        let ledger = MemoryLedger::new();
        let fingerprint = hash(b"doc");
        let other = hash(b"other");

        assert!(ledger.registration(&fingerprint).await.unwrap().is_none());

        let registered = ledger
            .submit_registration(RegistrationClaim::new(fingerprint, Locator::new("bafk")))
            .await
            .unwrap();
        ledger.submit_verification(other, false).await.unwrap();
        ledger.submit_verification(fingerprint, true).await.unwrap();

        assert_eq!(
            ledger.registration(&fingerprint).await.unwrap(),
            Some(registered)
        );
        assert_eq!(ledger.history(&fingerprint).await.unwrap().len(), 2);
        assert_eq!(ledger.history(&other).await.unwrap().len(), 1);
    }

    #[test]
    fn test_chain_rejects_tampered_records() {
        let mut chain = Chain::default();
        for verified in [true, false, true] {
            let record = chain
                .next(Claim::Verification {
                    fingerprint: hash(b"doc"),
                    verified,
                })
                .unwrap();
            chain.push(record);
        }
        let mut records = chain.records.clone();
        assert!(Chain::from_records(records.clone()).is_ok());

        records[1].claim = Claim::Verification {
            fingerprint: hash(b"doc"),
            verified: true,
        };
        assert!(matches!(
            Chain::from_records(records),
            Err(LedgerError::Corrupt { line: 2, .. })
        ));
    }
}
