//! In-process fixtures for exercising the pipelines end to end
//!
//! ```rust,ignore
//! use common::testkit::Harness;
//!
//! #[tokio::test]
//! async fn test_roundtrip() -> anyhow::Result<()> {
//!     let harness = Harness::new()?;
//!     let registration = harness.register_signed(b"hello-world").await?;
//!     let verdict = harness.verify_signed(&registration).await?;
//!     assert!(verdict.is_verified());
//!     Ok(())
//! }
//! ```
mod tampering;

pub use tampering::{Tamper, TamperingStore};

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::crypto::{MlDsa44, SignatureScheme};
use crate::ledger::MemoryLedger;
use crate::pipeline::{
    Registrar, Registration, RegistrationOptions, SignatureCheck, Signer, Verdict,
    VerificationPipeline, VerificationRequest,
};
use crate::registry::DocumentRegistry;
use crate::storage::MemoryContentStore;

/// Fresh ML-DSA-44 signer with a random key pair
pub fn generate_signer() -> Result<Signer> {
    let scheme: Arc<dyn SignatureScheme> = Arc::new(MlDsa44);
    let keypair = scheme
        .generate_keypair()
        .context("failed to generate test key pair")?;
    Ok(Signer::from_keypair(scheme, keypair))
}

/// Memory-backed store, ledger and registry wired into both pipelines
///
/// Fetches go through a [`TamperingStore`] so tests can corrupt what a
/// verifier sees without touching what was registered.
#[derive(Debug, Clone)]
pub struct Harness {
    pub store: TamperingStore,
    pub ledger: MemoryLedger,
    pub registry: DocumentRegistry,
    pub registrar: Registrar,
    pub pipeline: VerificationPipeline,
    pub signer: Signer,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_registry(DocumentRegistry::in_memory())
    }

    pub fn with_registry(registry: DocumentRegistry) -> Result<Self> {
        let store = TamperingStore::new(Arc::new(MemoryContentStore::new()));
        let ledger = MemoryLedger::new();
        let registrar = Registrar::new(
            Arc::new(store.clone()),
            Arc::new(ledger.clone()),
            registry.clone(),
        );
        let pipeline = VerificationPipeline::new(Arc::new(store.clone()), registry.clone());
        Ok(Self {
            store,
            ledger,
            registry,
            registrar,
            pipeline,
            signer: generate_signer()?,
        })
    }

    /// Register `document` signed by the harness signer
    pub async fn register_signed(&self, document: &[u8]) -> Result<Registration> {
        let options = RegistrationOptions {
            signer: Some(self.signer.clone()),
            envelope: None,
        };
        let registration = self
            .registrar
            .register(Bytes::copy_from_slice(document), &options)
            .await?;
        Ok(registration)
    }

    /// Signature check against the harness signer's public key
    pub fn signature_check(&self, registration: &Registration) -> Result<SignatureCheck> {
        let signature = registration
            .signature
            .clone()
            .context("registration carries no signature")?;
        Ok(SignatureCheck::Verify {
            scheme: self.signer.scheme().clone(),
            public_key: self.signer.public_key().clone(),
            signature,
        })
    }

    /// Verify a signed registration at its registered locator
    pub async fn verify_signed(&self, registration: &Registration) -> Result<Verdict> {
        let request =
            VerificationRequest::new(registration.entry.fingerprint, self.signature_check(registration)?)
                .at(registration.entry.locator.clone());
        Ok(self.pipeline.verify(&request).await)
    }
}
