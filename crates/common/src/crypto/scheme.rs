use std::sync::Arc;

use super::keys::{KeyPair, PrivateKey, PublicKey, Signature};
use super::ml_dsa::{MlDsa44, MlDsa65};
use crate::error::{Categorize, ErrorKind};

/// Errors raised by signature schemes and symmetric primitives
///
/// A signature that simply does not match is *not* an error; see
/// [`SignatureScheme::verify`].
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed {scheme} public key: expected {expected} bytes, got {got}")]
    MalformedPublicKey {
        scheme: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("malformed {scheme} private key: expected {expected} bytes, got {got}")]
    MalformedPrivateKey {
        scheme: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("malformed {scheme} signature: expected {expected} bytes, got {got}")]
    MalformedSignature {
        scheme: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid {scheme} key material: {reason}")]
    InvalidKey {
        scheme: &'static str,
        reason: String,
    },
    #[error("{scheme} key generation failed: {reason}")]
    KeyGeneration {
        scheme: &'static str,
        reason: String,
    },
    #[error("{scheme} signing failed: {reason}")]
    Signing {
        scheme: &'static str,
        reason: String,
    },
    #[error("{0} signing requires a private key")]
    MissingPrivateKey(&'static str),
    #[error("unknown signature scheme: {0}")]
    UnknownScheme(String),
    #[error("unknown cipher: {0}")]
    UnknownCipher(String),
    #[error("invalid symmetric key size, expected {expected}, got {got}")]
    SymmetricKeySize { expected: usize, got: usize },
    #[error("random number generation failed: {0}")]
    Random(String),
    #[error("{0} encryption failed")]
    Encrypt(&'static str),
}

impl Categorize for CryptoError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Crypto
    }
}

/// A post-quantum digital signature scheme
///
/// Implementations are stateless unit structs so they can be shared as
/// `Arc<dyn SignatureScheme>` and picked at runtime from configuration.
///
/// The message is always the exact document bytes; callers never pre-hash.
pub trait SignatureScheme: Send + Sync + std::fmt::Debug {
    /// Lowercase identifier, e.g. `ml-dsa-44`
    fn name(&self) -> &'static str;

    fn generate_keypair(&self) -> Result<KeyPair, CryptoError>;

    fn sign(&self, private_key: &PrivateKey, message: &[u8]) -> Result<Signature, CryptoError>;

    /// Check `signature` over `message` under `public_key`
    ///
    /// Returns `Ok(false)` on any mismatch (wrong key, altered message, altered
    /// signature). Errors are reserved for encodings this scheme cannot parse.
    fn verify(
        &self,
        public_key: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> Result<bool, CryptoError>;

    /// Derive the public key belonging to `private_key`
    fn public_key(&self, private_key: &PrivateKey) -> Result<PublicKey, CryptoError>;
}

/// Names accepted by [`scheme_by_name`]
pub const SCHEME_NAMES: &[&str] = &[MlDsa44::NAME, MlDsa65::NAME];

/// Default scheme for new keys
pub fn default_scheme() -> Arc<dyn SignatureScheme> {
    Arc::new(MlDsa44)
}

/// Resolve a configured scheme name (case-insensitive)
pub fn scheme_by_name(name: &str) -> Option<Arc<dyn SignatureScheme>> {
    match name.trim().to_ascii_lowercase().as_str() {
        MlDsa44::NAME => Some(Arc::new(MlDsa44)),
        MlDsa65::NAME => Some(Arc::new(MlDsa65)),
        _ => None,
    }
}

/// Like [`scheme_by_name`], with an error for unknown names
pub fn require_scheme(name: &str) -> Result<Arc<dyn SignatureScheme>, CryptoError> {
    scheme_by_name(name).ok_or_else(|| CryptoError::UnknownScheme(name.to_string()))
}
