//! Fingerprint registry
//!
//! Persisted mapping from a document [`Fingerprint`] to the [`Locator`] where
//! the document was stored, plus the ledger reference of its registration.
//!
//! Rules:
//! - one locator per fingerprint, first writer wins
//! - re-registering the same pair is a no-op returning the stored entry
//! - a different locator for a known fingerprint is a conflict, never an overwrite
//! - entries are never deleted
//!
//! The registry file is a JSON object keyed by hex fingerprint. It is rewritten
//! whole (temp file + rename) on every new registration, while the write lock
//! is held, so readers and other writers never observe partial state.

mod entry;

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::crypto::{Fingerprint, FingerprintError};
use crate::error::{Categorize, ErrorKind};
use crate::ledger::LedgerReference;
use crate::storage::Locator;

pub use entry::RegistryEntry;
use entry::StoredEntry;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("fingerprint {0} is not registered")]
    NotFound(Fingerprint),
    #[error("fingerprint {fingerprint} is already registered at {existing}, refusing {requested}")]
    Conflict {
        fingerprint: Fingerprint,
        existing: Locator,
        requested: Locator,
    },
    #[error("registry file {path} is invalid: {reason}")]
    Invalid { path: String, reason: String },
    #[error("invalid fingerprint key in registry file: {0}")]
    Fingerprint(#[from] FingerprintError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Categorize for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::Conflict { .. } => ErrorKind::Conflict,
            RegistryError::Invalid { .. } | RegistryError::Fingerprint(_) => ErrorKind::Config,
            RegistryError::Io(_) | RegistryError::Serde(_) => ErrorKind::Io,
        }
    }
}

/// Thread-safe, write-through fingerprint registry
///
/// Cloning is cheap and every clone shares the same state.
///
/// # Examples
///
/// ```ignore
/// let registry = DocumentRegistry::open("registry.json")?;
/// let entry = registry.register(fingerprint, locator, reference)?;
/// assert_eq!(registry.lookup(&fingerprint)?, entry);
/// ```
#[derive(Debug, Clone)]
pub struct DocumentRegistry {
    inner: Arc<RwLock<HashMap<Fingerprint, RegistryEntry>>>,
    path: Option<Arc<PathBuf>>,
}

impl DocumentRegistry {
    /// Load the registry at `path`
    ///
    /// A missing file is an empty registry; the file is only created on the
    /// first registration.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => Self::parse(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened registry");

        Ok(Self {
            inner: Arc::new(RwLock::new(entries)),
            path: Some(Arc::new(path)),
        })
    }

    /// A registry that never touches disk
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    fn parse(path: &Path, bytes: &[u8]) -> Result<HashMap<Fingerprint, RegistryEntry>, RegistryError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(HashMap::new());
        }
        let stored: BTreeMap<String, StoredEntry> =
            serde_json::from_slice(bytes).map_err(|e| RegistryError::Invalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        // keys differing only in case or a 0x prefix name the same fingerprint
        let mut entries = HashMap::with_capacity(stored.len());
        for (key, value) in stored {
            let fingerprint = Fingerprint::from_hex(&key)?;
            if entries
                .insert(fingerprint, value.into_entry(fingerprint))
                .is_some()
            {
                return Err(RegistryError::Invalid {
                    path: path.display().to_string(),
                    reason: format!("fingerprint {} appears more than once", fingerprint),
                });
            }
        }
        Ok(entries)
    }

    /// Bind `fingerprint` to `locator`
    ///
    /// Returns the stored entry. Registering the same pair again returns the
    /// existing entry without touching disk.
    ///
    /// Blocks on file I/O while holding the write lock; async callers run it
    /// on the blocking pool.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Conflict`] if the fingerprint is bound to another locator
    /// - [`RegistryError::Io`] if the file could not be written; nothing is
    ///   registered in that case
    pub fn register(
        &self,
        fingerprint: Fingerprint,
        locator: Locator,
        ledger_reference: LedgerReference,
    ) -> Result<RegistryEntry, RegistryError> {
        self.insert(fingerprint, locator, ledger_reference)
            .map(|(entry, _)| entry)
    }

    /// Like [`register`](Self::register), also reporting whether this call
    /// created the entry
    pub fn insert(
        &self,
        fingerprint: Fingerprint,
        locator: Locator,
        ledger_reference: LedgerReference,
    ) -> Result<(RegistryEntry, bool), RegistryError> {
        let mut entries = self.inner.write();

        if let Some(existing) = entries.get(&fingerprint) {
            return if existing.locator == locator {
                Ok((existing.clone(), false))
            } else {
                tracing::warn!(
                    %fingerprint,
                    existing = %existing.locator,
                    requested = %locator,
                    "registry conflict"
                );
                Err(RegistryError::Conflict {
                    fingerprint,
                    existing: existing.locator.clone(),
                    requested: locator,
                })
            };
        }

        let entry = RegistryEntry {
            fingerprint,
            locator,
            ledger_reference: Some(ledger_reference),
            registered_at: Some(Utc::now()),
        };
        entries.insert(fingerprint, entry.clone());

        if let Err(e) = self.persist(&entries) {
            entries.remove(&fingerprint);
            tracing::error!(%fingerprint, error = %e, "failed to persist registry, rolled back");
            return Err(e);
        }

        tracing::info!(%fingerprint, locator = %entry.locator, "registered document");
        Ok((entry, true))
    }

    /// Fail fast if `fingerprint` is bound to a locator other than `locator`
    ///
    /// Returns the existing entry when the pair is already registered.
    pub fn check(
        &self,
        fingerprint: &Fingerprint,
        locator: &Locator,
    ) -> Result<Option<RegistryEntry>, RegistryError> {
        match self.inner.read().get(fingerprint) {
            Some(existing) if &existing.locator == locator => Ok(Some(existing.clone())),
            Some(existing) => Err(RegistryError::Conflict {
                fingerprint: *fingerprint,
                existing: existing.locator.clone(),
                requested: locator.clone(),
            }),
            None => Ok(None),
        }
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<RegistryEntry, RegistryError> {
        self.inner
            .read()
            .get(fingerprint)
            .cloned()
            .ok_or(RegistryError::NotFound(*fingerprint))
    }

    /// All entries, ordered by fingerprint
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<_> = self.inner.read().values().cloned().collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Rewrite the whole file atomically; caller holds the write lock
    fn persist(&self, entries: &HashMap<Fingerprint, RegistryEntry>) -> Result<(), RegistryError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let stored: BTreeMap<String, StoredEntry> = entries
            .values()
            .map(|entry| (entry.fingerprint.to_hex(), StoredEntry::from(entry)))
            .collect();
        let json = serde_json::to_vec_pretty(&stored)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| RegistryError::Io(e.error))?;
        Ok(())
    }
}
