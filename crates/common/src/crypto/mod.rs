//! Cryptographic primitives for document integrity
//!
//! - **Fingerprints**: SHA3-256 over the exact document bytes ([`hash`])
//! - **Signatures**: ML-DSA (FIPS 204) behind the [`SignatureScheme`] trait
//! - **Payload encryption**: AES-256-GCM or ChaCha20-Poly1305 behind [`SymmetricCipher`]
//! - **Envelopes**: per-document content keys wrapped with AES-KW, bound to an
//!   integrity tag ([`EnvelopeCodec`])
//!
//! # Security Model
//!
//! ## Signing
//! The signed message is always the raw document bytes, never an encrypted or
//! re-encoded form. Verification returns `false` for any mismatch and only
//! errors on key or signature encodings the scheme cannot parse.
//!
//! ## Envelopes
//! Each envelope draws a fresh content key and nonce. The content key is only
//! persisted wrapped under the recipient's [`KeyEncryptionKey`]. The integrity
//! tag is verified before any decryption happens, so tampered envelopes fail
//! closed.

mod cipher;
mod envelope;
mod hash;
mod keys;
mod ml_dsa;
mod scheme;

pub use cipher::{
    cipher_by_name, Aes256GcmCipher, ChaCha20Poly1305Cipher, SymmetricCipher, SymmetricKey,
    SYMMETRIC_KEY_SIZE,
};
pub use envelope::{
    EncryptedEnvelope, EnvelopeCodec, EnvelopeError, KeyEncryptionKey, RecipientContext, TagMode,
    WRAPPED_KEY_SIZE,
};
pub use hash::{hash, Fingerprint, FingerprintError, FINGERPRINT_SIZE};
pub use keys::{KeyError, KeyPair, PrivateKey, PublicKey, Signature, SignerId};
pub use ml_dsa::{MlDsa44, MlDsa65};
pub use scheme::{
    default_scheme, require_scheme, scheme_by_name, CryptoError, SignatureScheme, SCHEME_NAMES,
};
