use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::crypto::{
    hash, Aes256GcmCipher, CryptoError, EnvelopeCodec, EnvelopeError, Fingerprint, KeyPair,
    PrivateKey, PublicKey, RecipientContext, Signature, SignatureScheme, SignerId,
    SymmetricCipher,
};
use crate::error::{Categorize, ErrorKind};
use crate::ledger::{Ledger, LedgerError, LedgerRecord, RegistrationClaim};
use crate::registry::{DocumentRegistry, RegistryEntry, RegistryError};
use crate::storage::{ContentStore, Locator, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("registry write task failed: {0}")]
    Task(String),
}

impl Categorize for RegistrarError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistrarError::Crypto(e) => e.kind(),
            RegistrarError::Envelope(e) => e.kind(),
            RegistrarError::Storage(e) => e.kind(),
            RegistrarError::Ledger(e) => e.kind(),
            RegistrarError::Registry(e) => e.kind(),
            RegistrarError::Task(_) => ErrorKind::Io,
        }
    }
}

/// A signature scheme bound to the signing party's private key
#[derive(Debug, Clone)]
pub struct Signer {
    scheme: Arc<dyn SignatureScheme>,
    private_key: Arc<PrivateKey>,
    public_key: PublicKey,
}

impl Signer {
    pub fn new(
        scheme: Arc<dyn SignatureScheme>,
        private_key: Arc<PrivateKey>,
    ) -> Result<Self, CryptoError> {
        let public_key = scheme.public_key(&private_key)?;
        Ok(Self {
            scheme,
            private_key,
            public_key,
        })
    }

    pub fn from_keypair(scheme: Arc<dyn SignatureScheme>, keypair: KeyPair) -> Self {
        Self {
            scheme,
            private_key: Arc::new(keypair.private_key),
            public_key: keypair.public_key,
        }
    }

    pub fn scheme(&self) -> &Arc<dyn SignatureScheme> {
        &self.scheme
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn signer_id(&self) -> SignerId {
        self.public_key.signer_id()
    }

    /// Sign the raw document bytes
    pub fn sign(&self, document: &[u8]) -> Result<Signature, CryptoError> {
        self.scheme.sign(&self.private_key, document)
    }

    /// Envelope recipient context owned by this signer
    pub fn recipient(&self) -> Result<RecipientContext, CryptoError> {
        RecipientContext::for_owner(self.scheme.clone(), self.private_key.clone())
    }
}

/// How a document should be registered
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    /// Sign the raw document
    pub signer: Option<Signer>,
    /// Store the document sealed in an envelope for this recipient
    pub envelope: Option<RecipientContext>,
}

/// Result of a registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub entry: RegistryEntry,
    pub signature: Option<Signature>,
    pub signer: Option<SignerId>,
    /// The fingerprint was already registered at this locator; nothing new was recorded
    pub existing: bool,
}

/// Registration direction of the data flow
///
/// hash → sign → seal → store → ledger → registry. The registry write is the
/// last step, so an abandoned registration never leaves registry state behind.
///
/// Check, ledger submission and registry write run under a per-fingerprint
/// lock shared by all clones, so concurrent registrations of one document
/// produce a single ledger claim.
#[derive(Debug, Clone)]
pub struct Registrar {
    store: Arc<dyn ContentStore>,
    ledger: Arc<dyn Ledger>,
    registry: DocumentRegistry,
    codec: EnvelopeCodec<Arc<dyn SymmetricCipher>>,
    in_flight: Arc<Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Registrar {
    pub fn new(
        store: Arc<dyn ContentStore>,
        ledger: Arc<dyn Ledger>,
        registry: DocumentRegistry,
    ) -> Self {
        Self {
            store,
            ledger,
            registry,
            codec: EnvelopeCodec::new(Arc::new(Aes256GcmCipher) as Arc<dyn SymmetricCipher>),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn SymmetricCipher>) -> Self {
        self.codec = EnvelopeCodec::new(cipher);
        self
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Hash, optionally sign and seal, store and register `document`
    #[tracing::instrument(skip_all, fields(len = document.len()))]
    pub async fn register(
        &self,
        document: Bytes,
        options: &RegistrationOptions,
    ) -> Result<Registration, RegistrarError> {
        let fingerprint = hash(&document);
        let signature = options
            .signer
            .as_ref()
            .map(|signer| signer.sign(&document))
            .transpose()?;

        let payload = match &options.envelope {
            Some(recipient) => Bytes::from(self.codec.seal(&document, recipient)?),
            None => document,
        };
        let locator = self.store.store(payload).await?;
        tracing::debug!(%fingerprint, %locator, "stored document");

        let mut claim = RegistrationClaim::new(fingerprint, locator);
        if let (Some(signer), Some(signature)) = (&options.signer, &signature) {
            claim.signer = Some(signer.signer_id());
            claim.scheme = Some(signer.scheme().name().to_string());
            claim.signature = Some(signature.to_hex());
        }

        let (entry, existing) = self.record(claim).await?;
        Ok(Registration {
            entry,
            signer: options.signer.as_ref().map(Signer::signer_id),
            signature,
            existing,
        })
    }

    /// Register a document that is already stored at `locator`
    pub async fn register_stored(
        &self,
        fingerprint: Fingerprint,
        locator: Locator,
    ) -> Result<Registration, RegistrarError> {
        let (entry, existing) = self
            .record(RegistrationClaim::new(fingerprint, locator))
            .await?;
        Ok(Registration {
            entry,
            signature: None,
            signer: None,
            existing,
        })
    }

    async fn record(
        &self,
        claim: RegistrationClaim,
    ) -> Result<(RegistryEntry, bool), RegistrarError> {
        let fingerprint = claim.fingerprint;
        let lock = self.in_flight.lock().entry(fingerprint).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.record_locked(claim).await
        };

        // drop the lock entry once no other registration is waiting on it
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&fingerprint)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2)
        {
            in_flight.remove(&fingerprint);
        }
        result
    }

    async fn record_locked(
        &self,
        claim: RegistrationClaim,
    ) -> Result<(RegistryEntry, bool), RegistrarError> {
        // fail fast before anything reaches the ledger
        if let Some(entry) = self.registry.check(&claim.fingerprint, &claim.locator)? {
            tracing::info!(fingerprint = %claim.fingerprint, "already registered");
            return Ok((entry, true));
        }

        let fingerprint = claim.fingerprint;
        let locator = claim.locator.clone();
        let record = self.ledger.submit_registration(claim).await?;

        let registry = self.registry.clone();
        let (entry, created) = tokio::task::spawn_blocking(move || {
            registry.insert(fingerprint, locator, record.reference)
        })
        .await
        .map_err(|e| RegistrarError::Task(e.to_string()))??;
        Ok((entry, !created))
    }

    /// Record the outcome of a verification on the ledger
    pub async fn record_verification(
        &self,
        fingerprint: Fingerprint,
        verified: bool,
    ) -> Result<LedgerRecord, RegistrarError> {
        self.registry.lookup(&fingerprint)?;
        let record = self.ledger.submit_verification(fingerprint, verified).await?;
        tracing::info!(%fingerprint, verified, reference = %record.reference, "recorded verification");
        Ok(record)
    }
}
