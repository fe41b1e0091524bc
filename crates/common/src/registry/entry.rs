use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Fingerprint;
use crate::ledger::LedgerReference;
use crate::storage::Locator;

/// A registered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub fingerprint: Fingerprint,
    pub locator: Locator,
    /// `None` only for entries imported from the bare `hash -> cid` format
    pub ledger_reference: Option<LedgerReference>,
    /// `None` only for entries imported from the bare `hash -> cid` format
    pub registered_at: Option<DateTime<Utc>>,
}

/// Value side of the registry file
///
/// Older registry files map fingerprints straight to a CID string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(super) enum StoredEntry {
    Full {
        locator: Locator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ledger_reference: Option<LedgerReference>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registered_at: Option<DateTime<Utc>>,
    },
    Legacy(Locator),
}

impl StoredEntry {
    pub(super) fn into_entry(self, fingerprint: Fingerprint) -> RegistryEntry {
        match self {
            StoredEntry::Full {
                locator,
                ledger_reference,
                registered_at,
            } => RegistryEntry {
                fingerprint,
                locator,
                ledger_reference,
                registered_at,
            },
            StoredEntry::Legacy(locator) => RegistryEntry {
                fingerprint,
                locator,
                ledger_reference: None,
                registered_at: None,
            },
        }
    }
}

impl From<&RegistryEntry> for StoredEntry {
    fn from(entry: &RegistryEntry) -> Self {
        StoredEntry::Full {
            locator: entry.locator.clone(),
            ledger_reference: entry.ledger_reference.clone(),
            registered_at: entry.registered_at,
        }
    }
}
