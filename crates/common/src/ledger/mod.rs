//! Ledger collaborators
//!
//! The ledger is the external, append-only system of record for registration
//! and verification claims. The integrity core only stores and echoes the
//! opaque [`LedgerReference`] it hands back; consensus and transaction
//! mechanics are out of scope.
//!
//! - [`JournalLedger`]: a hash-chained JSON-lines journal on local disk
//! - [`MemoryLedger`]: the same chain, in memory

mod journal;
mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::crypto::{Fingerprint, SignerId};
use crate::error::{Categorize, ErrorKind};
use crate::storage::Locator;

pub use journal::JournalLedger;
pub use memory::MemoryLedger;

/// Opaque token returned by a ledger for a recorded claim
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerReference(String);

impl LedgerReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LedgerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerReference({})", self.0)
    }
}

impl From<String> for LedgerReference {
    fn from(reference: String) -> Self {
        Self(reference)
    }
}

/// What a registration asserts about a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationClaim {
    pub fingerprint: Fingerprint,
    pub locator: Locator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Hex signature over the raw document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl RegistrationClaim {
    pub fn new(fingerprint: Fingerprint, locator: Locator) -> Self {
        Self {
            fingerprint,
            locator,
            signer: None,
            scheme: None,
            signature: None,
        }
    }
}

/// A claim recorded on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Claim {
    /// Provisioning marker written once when a ledger is deployed
    Genesis { label: String },
    Registration(RegistrationClaim),
    Verification {
        fingerprint: Fingerprint,
        verified: bool,
    },
}

impl Claim {
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Claim::Genesis { .. } => None,
            Claim::Registration(claim) => Some(&claim.fingerprint),
            Claim::Verification { fingerprint, .. } => Some(fingerprint),
        }
    }
}

/// A claim together with where and when it was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub reference: LedgerReference,
    /// Reference of the preceding record, `None` for the first one
    #[serde(default)]
    pub previous: Option<LedgerReference>,
    pub claim: Claim,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// Chain a new record after `previous`
    pub(crate) fn chain(
        previous: Option<&LedgerReference>,
        claim: Claim,
    ) -> Result<Self, LedgerError> {
        let reference = chain_reference(previous, &claim)?;
        Ok(Self {
            reference,
            previous: previous.cloned(),
            claim,
            recorded_at: Utc::now(),
        })
    }
}

/// `0x || hex(SHA3-256(previous || claim JSON))`
pub fn chain_reference(
    previous: Option<&LedgerReference>,
    claim: &Claim,
) -> Result<LedgerReference, LedgerError> {
    let mut hasher = Sha3_256::new();
    if let Some(previous) = previous {
        hasher.update(previous.as_str().as_bytes());
    }
    hasher.update(serde_json::to_vec(claim)?);
    Ok(LedgerReference(format!(
        "0x{}",
        hex::encode(hasher.finalize())
    )))
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger not deployed at {0}")]
    NotDeployed(String),
    #[error("ledger already deployed at {0}")]
    AlreadyDeployed(String),
    #[error("ledger journal corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Categorize for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotDeployed(_) | LedgerError::AlreadyDeployed(_) => ErrorKind::Config,
            LedgerError::Corrupt { .. } => ErrorKind::Integrity,
            LedgerError::Io(_) | LedgerError::Serde(_) => ErrorKind::Io,
        }
    }
}

/// Append-only system of record for claims
#[async_trait]
pub trait Ledger: Send + Sync + fmt::Debug {
    /// Record that `fingerprint` was stored at `locator`
    async fn submit_registration(
        &self,
        claim: RegistrationClaim,
    ) -> Result<LedgerRecord, LedgerError>;

    /// Record the outcome of a verification
    async fn submit_verification(
        &self,
        fingerprint: Fingerprint,
        verified: bool,
    ) -> Result<LedgerRecord, LedgerError>;

    /// Earliest registration record for `fingerprint`, if any
    async fn registration(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<LedgerRecord>, LedgerError>;

    /// Every record mentioning `fingerprint`, oldest first
    async fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<LedgerRecord>, LedgerError>;
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for std::sync::Arc<T> {
    async fn submit_registration(
        &self,
        claim: RegistrationClaim,
    ) -> Result<LedgerRecord, LedgerError> {
        (**self).submit_registration(claim).await
    }

    async fn submit_verification(
        &self,
        fingerprint: Fingerprint,
        verified: bool,
    ) -> Result<LedgerRecord, LedgerError> {
        (**self).submit_verification(fingerprint, verified).await
    }

    async fn registration(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<LedgerRecord>, LedgerError> {
        (**self).registration(fingerprint).await
    }

    async fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<LedgerRecord>, LedgerError> {
        (**self).history(fingerprint).await
    }
}
