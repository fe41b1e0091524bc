use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{
    hash, Aes256GcmCipher, EnvelopeCodec, EnvelopeError, Fingerprint, PublicKey,
    RecipientContext, Signature, SignatureScheme, SignerId, SymmetricCipher,
};
use crate::error::{Categorize, ErrorKind};
use crate::ledger::LedgerReference;
use crate::registry::DocumentRegistry;
use crate::storage::{ContentStore, Locator};

/// Progress through the verification protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Start,
    Fetched,
    HashVerified,
    SignatureVerified,
    RegistryConsistent,
    Verified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a verification failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("content tampered: expected {expected}, got {actual}")]
    ContentTampered {
        expected: Fingerprint,
        actual: Fingerprint,
    },
    #[error("envelope failed authentication: {0}")]
    EnvelopeTampered(String),
    #[error("signature does not match document")]
    SignatureInvalid,
    #[error("malformed key material: {0}")]
    MalformedKeyMaterial(String),
    #[error("fingerprint is not registered")]
    NotRegistered,
    #[error("registry maps fingerprint to {registered}, not {fetched}")]
    RegistryMismatch {
        registered: Locator,
        fetched: Locator,
    },
}

impl Categorize for FailureReason {
    fn kind(&self) -> ErrorKind {
        match self {
            FailureReason::StorageUnavailable(_) => ErrorKind::Io,
            FailureReason::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            FailureReason::ContentTampered { .. }
            | FailureReason::EnvelopeTampered(_)
            | FailureReason::SignatureInvalid
            | FailureReason::RegistryMismatch { .. } => ErrorKind::Integrity,
            FailureReason::MalformedKeyMaterial(_) => ErrorKind::Crypto,
            FailureReason::NotRegistered => ErrorKind::NotFound,
        }
    }
}

/// A failed verification: the last stage reached and what went wrong after it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("verification failed after {stage}: {reason}")]
pub struct VerificationFailure {
    pub stage: Stage,
    pub reason: FailureReason,
}

impl Categorize for VerificationFailure {
    fn kind(&self) -> ErrorKind {
        self.reason.kind()
    }
}

/// Who registered a verified document, and where and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub fingerprint: Fingerprint,
    pub locator: Locator,
    pub signer: Option<SignerId>,
    pub registered_at: Option<DateTime<Utc>>,
    pub ledger_reference: Option<LedgerReference>,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub enum Verdict {
    Verified {
        provenance: Provenance,
        /// Verified plaintext document
        document: Bytes,
    },
    Failed(VerificationFailure),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified { .. })
    }

    pub fn into_result(self) -> Result<(Provenance, Bytes), VerificationFailure> {
        match self {
            Verdict::Verified {
                provenance,
                document,
            } => Ok((provenance, document)),
            Verdict::Failed(failure) => Err(failure),
        }
    }

    fn fail(stage: Stage, reason: FailureReason) -> Self {
        tracing::warn!(%stage, %reason, "verification failed");
        Verdict::Failed(VerificationFailure { stage, reason })
    }
}

/// The signature stage is never skipped implicitly
#[derive(Clone)]
pub enum SignatureCheck {
    Verify {
        scheme: Arc<dyn SignatureScheme>,
        public_key: PublicKey,
        signature: Signature,
    },
    /// Caller explicitly accepts an unsigned verification
    OptOut,
}

impl fmt::Debug for SignatureCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureCheck::Verify {
                scheme, public_key, ..
            } => write!(f, "Verify({}, {})", scheme.name(), public_key.signer_id()),
            SignatureCheck::OptOut => f.write_str("OptOut"),
        }
    }
}

/// What the caller claims about a document
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Claimed fingerprint of the plaintext document
    pub fingerprint: Fingerprint,
    /// Where to fetch from; the registry's locator when `None`
    pub locator: Option<Locator>,
    pub signature: SignatureCheck,
    /// Open the fetched bytes as an envelope for this recipient
    pub envelope: Option<RecipientContext>,
}

impl VerificationRequest {
    pub fn new(fingerprint: Fingerprint, signature: SignatureCheck) -> Self {
        Self {
            fingerprint,
            locator: None,
            signature,
            envelope: None,
        }
    }

    pub fn at(mut self, locator: Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn sealed_for(mut self, recipient: RecipientContext) -> Self {
        self.envelope = Some(recipient);
        self
    }
}

/// Fetch → hash check → signature check → registry consistency
///
/// Linear and fail-fast. Storage errors are reported, never retried here.
#[derive(Debug, Clone)]
pub struct VerificationPipeline {
    store: Arc<dyn ContentStore>,
    registry: DocumentRegistry,
    codec: EnvelopeCodec<Arc<dyn SymmetricCipher>>,
}

impl VerificationPipeline {
    pub fn new(store: Arc<dyn ContentStore>, registry: DocumentRegistry) -> Self {
        Self {
            store,
            registry,
            codec: EnvelopeCodec::new(Arc::new(Aes256GcmCipher) as Arc<dyn SymmetricCipher>),
        }
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn SymmetricCipher>) -> Self {
        self.codec = EnvelopeCodec::new(cipher);
        self
    }

    #[tracing::instrument(skip_all, fields(fingerprint = %request.fingerprint))]
    pub async fn verify(&self, request: &VerificationRequest) -> Verdict {
        // Start: resolve the locator
        let registered = self.registry.lookup(&request.fingerprint).ok();
        let locator = match (&request.locator, &registered) {
            (Some(locator), _) => locator.clone(),
            (None, Some(entry)) => entry.locator.clone(),
            (None, None) => return Verdict::fail(Stage::Start, FailureReason::NotRegistered),
        };

        // Start -> Fetched
        let fetched = match self.store.fetch(&locator).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Verdict::fail(Stage::Start, FailureReason::StorageUnavailable(e.to_string()))
            }
        };
        let document = match &request.envelope {
            None => fetched,
            Some(recipient) => match self.codec.open(&fetched, recipient) {
                Ok(plaintext) => Bytes::from(plaintext),
                Err(EnvelopeError::Malformed(reason)) => {
                    return Verdict::fail(Stage::Fetched, FailureReason::MalformedEnvelope(reason))
                }
                Err(EnvelopeError::Integrity(reason)) => {
                    return Verdict::fail(
                        Stage::Fetched,
                        FailureReason::EnvelopeTampered(reason.to_string()),
                    )
                }
                Err(EnvelopeError::Crypto(e)) => {
                    return Verdict::fail(
                        Stage::Fetched,
                        FailureReason::MalformedKeyMaterial(e.to_string()),
                    )
                }
            },
        };
        tracing::debug!(%locator, len = document.len(), "fetched document");

        // Fetched -> HashVerified
        let actual = hash(&document);
        if actual != request.fingerprint {
            return Verdict::fail(
                Stage::Fetched,
                FailureReason::ContentTampered {
                    expected: request.fingerprint,
                    actual,
                },
            );
        }

        // HashVerified -> SignatureVerified
        let signer = match &request.signature {
            SignatureCheck::OptOut => None,
            SignatureCheck::Verify {
                scheme,
                public_key,
                signature,
            } => match scheme.verify(public_key, &document, signature) {
                Ok(true) => Some(public_key.signer_id()),
                Ok(false) => {
                    return Verdict::fail(Stage::HashVerified, FailureReason::SignatureInvalid)
                }
                Err(e) => {
                    return Verdict::fail(
                        Stage::HashVerified,
                        FailureReason::MalformedKeyMaterial(e.to_string()),
                    )
                }
            },
        };

        // SignatureVerified -> RegistryConsistent
        let Some(entry) = registered else {
            return Verdict::fail(Stage::SignatureVerified, FailureReason::NotRegistered);
        };
        if entry.locator != locator {
            return Verdict::fail(
                Stage::SignatureVerified,
                FailureReason::RegistryMismatch {
                    registered: entry.locator,
                    fetched: locator,
                },
            );
        }

        tracing::info!(%locator, "document verified");
        Verdict::Verified {
            provenance: Provenance {
                fingerprint: entry.fingerprint,
                locator: entry.locator,
                signer,
                registered_at: entry.registered_at,
                ledger_reference: entry.ledger_reference,
            },
            document,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{KeyEncryptionKey, MlDsa44};
    use crate::ledger::LedgerReference;
    use crate::storage::MemoryContentStore;

    struct Fixture {
        store: MemoryContentStore,
        registry: DocumentRegistry,
        pipeline: VerificationPipeline,
    }

    fn fixture() -> Fixture {
        let store = MemoryContentStore::new();
        let registry = DocumentRegistry::in_memory();
        let pipeline = VerificationPipeline::new(Arc::new(store.clone()), registry.clone());
        Fixture {
            store,
            registry,
            pipeline,
        }
    }

    async fn put(fixture: &Fixture, document: &'static [u8]) -> Locator {
        let locator = fixture.store.store(Bytes::from_static(document)).await.unwrap();
        fixture
            .registry
            .register(hash(document), locator.clone(), LedgerReference::new("0x01"))
            .unwrap();
        locator
    }

    fn expect_failure(verdict: Verdict) -> VerificationFailure {
        match verdict {
            Verdict::Failed(failure) => failure,
            Verdict::Verified { .. } => panic!("expected a failed verdict"),
        }
    }

    #[tokio::test]
    async fn test_verified_without_signature() {
        let f = fixture();
        let locator = put(&f, b"hello-world").await;

        let request = VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut);
        let (provenance, document) = f.pipeline.verify(&request).await.into_result().unwrap();
        assert_eq!(provenance.locator, locator);
        assert_eq!(provenance.signer, None);
        assert_eq!(
            provenance.ledger_reference,
            Some(LedgerReference::new("0x01"))
        );
        assert_eq!(document, &b"hello-world"[..]);
    }

    #[tokio::test]
    async fn test_verified_with_signature() {
        let f = fixture();
        put(&f, b"hello-world").await;
        let keypair = MlDsa44.generate_keypair().unwrap();
        let signature = MlDsa44.sign(&keypair.private_key, b"hello-world").unwrap();

        let request = VerificationRequest::new(
            hash(b"hello-world"),
            SignatureCheck::Verify {
                scheme: Arc::new(MlDsa44),
                public_key: keypair.public_key.clone(),
                signature,
            },
        );
        let (provenance, _) = f.pipeline.verify(&request).await.into_result().unwrap();
        assert_eq!(provenance.signer, Some(keypair.public_key.signer_id()));
    }

    #[tokio::test]
    async fn test_tampered_content() {
        let f = fixture();
        let locator = put(&f, b"hello-world").await;
        f.store.overwrite(&locator, Bytes::from_static(b"hello-w0rld"));

        let request = VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut);
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert_eq!(failure.stage, Stage::Fetched);
        assert!(matches!(
            failure.reason,
            FailureReason::ContentTampered { .. }
        ));
        assert_eq!(failure.kind(), ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn test_invalid_signature() {
        let f = fixture();
        put(&f, b"hello-world").await;
        let keypair = MlDsa44.generate_keypair().unwrap();
        let signature = MlDsa44.sign(&keypair.private_key, b"something else").unwrap();

        let request = VerificationRequest::new(
            hash(b"hello-world"),
            SignatureCheck::Verify {
                scheme: Arc::new(MlDsa44),
                public_key: keypair.public_key,
                signature,
            },
        );
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert_eq!(failure.stage, Stage::HashVerified);
        assert_eq!(failure.reason, FailureReason::SignatureInvalid);
    }

    #[tokio::test]
    async fn test_malformed_public_key() {
        let f = fixture();
        put(&f, b"hello-world").await;

        let request = VerificationRequest::new(
            hash(b"hello-world"),
            SignatureCheck::Verify {
                scheme: Arc::new(MlDsa44),
                public_key: PublicKey::from(vec![1u8; 10]),
                signature: Signature::from(vec![0u8; 2420]),
            },
        );
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert!(matches!(
            failure.reason,
            FailureReason::MalformedKeyMaterial(_)
        ));
        assert_eq!(failure.kind(), ErrorKind::Crypto);
    }

    #[tokio::test]
    async fn test_registry_mismatch() {
        let f = fixture();
        put(&f, b"hello-world").await;
        // same bytes reachable under a second locator
        let other = Locator::new("locB");
        f.store.overwrite(&other, Bytes::from_static(b"hello-world"));

        let request =
            VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut).at(other);
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert_eq!(failure.stage, Stage::SignatureVerified);
        assert!(matches!(
            failure.reason,
            FailureReason::RegistryMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_not_registered() {
        let f = fixture();
        let request = VerificationRequest::new(hash(b"unknown"), SignatureCheck::OptOut);
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert_eq!(failure.stage, Stage::Start);
        assert_eq!(failure.reason, FailureReason::NotRegistered);

        // fetchable but never registered
        let locator = f.store.store(Bytes::from_static(b"loose")).await.unwrap();
        let request =
            VerificationRequest::new(hash(b"loose"), SignatureCheck::OptOut).at(locator);
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert_eq!(failure.stage, Stage::SignatureVerified);
        assert_eq!(failure.reason, FailureReason::NotRegistered);
    }

    #[tokio::test]
    async fn test_storage_unavailable() {
        let f = fixture();
        let request = VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut)
            .at(Locator::new("missing"));
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert_eq!(failure.stage, Stage::Start);
        assert!(matches!(
            failure.reason,
            FailureReason::StorageUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_envelope_round_trip_and_tamper() {
        let f = fixture();
        let recipient = RecipientContext::new(KeyEncryptionKey::derive(b"owner secret"));
        let sealed = EnvelopeCodec::<Aes256GcmCipher>::default()
            .seal(b"hello-world", &recipient)
            .unwrap();
        let locator = f.store.store(Bytes::from(sealed.clone())).await.unwrap();
        f.registry
            .register(hash(b"hello-world"), locator.clone(), LedgerReference::new("0x02"))
            .unwrap();

        let request = VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut)
            .sealed_for(recipient.clone());
        let (_, document) = f.pipeline.verify(&request).await.into_result().unwrap();
        assert_eq!(document, &b"hello-world"[..]);

        let mut tampered = sealed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        f.store.overwrite(&locator, Bytes::from(tampered));
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert!(matches!(
            failure.reason,
            FailureReason::EnvelopeTampered(_)
        ));

        f.store.overwrite(&locator, Bytes::from_static(b"short"));
        let failure = expect_failure(f.pipeline.verify(&request).await);
        assert!(matches!(
            failure.reason,
            FailureReason::MalformedEnvelope(_)
        ));
    }
}
