//! Hybrid encryption envelope
//!
//! An envelope carries an AEAD-encrypted document together with everything a
//! recipient needs to authenticate and decrypt it:
//!
//! ```text
//! [ len: u32 LE ][ wrapped content key (AES-KW, 40 bytes) ]
//! [ len: u32 LE ][ nonce (cipher nonce size)              ]
//! [ len: u32 LE ][ ciphertext (AEAD output incl. tag)     ]
//! [ len: u32 LE ][ integrity tag                          ]
//! ```
//!
//! The content key is fresh for every envelope and only ever stored wrapped
//! under the recipient's [`KeyEncryptionKey`]. The integrity tag covers the
//! first three fields and is checked before anything is decrypted:
//!
//! - [`TagMode::Digest`]: SHA3-256 of the tag preimage, compared in constant time
//! - [`TagMode::Signature`]: a post-quantum signature over the tag preimage
//!
//! Parsing problems surface as [`EnvelopeError::Malformed`]; anything that looks
//! like tampering surfaces as [`EnvelopeError::Integrity`].

use std::fmt;
use std::sync::Arc;

use aes_kw::KekAes256 as Kek;
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::cipher::{Aes256GcmCipher, SymmetricCipher, SymmetricKey, SYMMETRIC_KEY_SIZE};
use super::keys::{PrivateKey, PublicKey, Signature};
use super::scheme::{CryptoError, SignatureScheme};
use crate::error::{Categorize, ErrorKind};

/// Size of an AES-KW wrapped content key (key + 8 byte integrity block)
pub const WRAPPED_KEY_SIZE: usize = SYMMETRIC_KEY_SIZE + 8;
/// Size of a length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;
/// Size of a key-encryption key
pub const KEK_SIZE: usize = 32;

const KEK_DOMAIN: &[u8] = b"qdv/envelope/kek/v1";
const TAG_DOMAIN: &[u8] = b"qdv/envelope/tag/v1";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("envelope integrity check failed: {0}")]
    Integrity(&'static str),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl Categorize for EnvelopeError {
    fn kind(&self) -> ErrorKind {
        match self {
            EnvelopeError::Malformed(_) => ErrorKind::MalformedEnvelope,
            EnvelopeError::Integrity(_) => ErrorKind::Integrity,
            EnvelopeError::Crypto(e) => e.kind(),
        }
    }
}

/// Recipient key used to wrap per-envelope content keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyEncryptionKey([u8; KEK_SIZE]);

impl KeyEncryptionKey {
    /// Derive a KEK from recipient secret material (a private key, a passphrase)
    pub fn derive(secret: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(KEK_DOMAIN);
        hasher.update(secret);
        let digest = hasher.finalize();
        let mut bytes = [0u8; KEK_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    fn wrap(&self, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
        Kek::from(self.0)
            .wrap_vec(key.bytes())
            .map_err(|_| CryptoError::Encrypt("aes-kw"))
    }

    fn unwrap(&self, wrapped: &[u8]) -> Option<SymmetricKey> {
        let mut unwrapped = Kek::from(self.0).unwrap_vec(wrapped).ok()?;
        let key = SymmetricKey::from_slice(&unwrapped).ok();
        unwrapped.zeroize();
        key
    }
}

impl From<[u8; KEK_SIZE]> for KeyEncryptionKey {
    fn from(bytes: [u8; KEK_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for KeyEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyEncryptionKey(<redacted>)")
    }
}

/// How an envelope's integrity tag is produced and checked
#[derive(Clone)]
pub enum TagMode {
    /// SHA3-256 digest of the tag preimage
    Digest,
    /// Signature over the tag preimage
    ///
    /// Sealing needs `private_key`; opening only needs `public_key`.
    Signature {
        scheme: Arc<dyn SignatureScheme>,
        public_key: PublicKey,
        private_key: Option<Arc<PrivateKey>>,
    },
}

impl fmt::Debug for TagMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagMode::Digest => f.write_str("Digest"),
            TagMode::Signature {
                scheme,
                public_key,
                private_key,
            } => f
                .debug_struct("Signature")
                .field("scheme", &scheme.name())
                .field("signer", &public_key.signer_id())
                .field("can_sign", &private_key.is_some())
                .finish(),
        }
    }
}

/// Everything the codec needs to know about the envelope's recipient
#[derive(Debug, Clone)]
pub struct RecipientContext {
    kek: KeyEncryptionKey,
    tag: TagMode,
}

impl RecipientContext {
    /// Digest-tagged context for the given KEK
    pub fn new(kek: KeyEncryptionKey) -> Self {
        Self {
            kek,
            tag: TagMode::Digest,
        }
    }

    pub fn with_tag(mut self, tag: TagMode) -> Self {
        self.tag = tag;
        self
    }

    /// Signature-tagged context owned by the holder of `private_key`
    ///
    /// The KEK is derived from the private key bytes, so only the key owner
    /// can open envelopes sealed for them.
    pub fn for_owner(
        scheme: Arc<dyn SignatureScheme>,
        private_key: Arc<PrivateKey>,
    ) -> Result<Self, CryptoError> {
        let public_key = scheme.public_key(&private_key)?;
        let kek = KeyEncryptionKey::derive(private_key.as_bytes());
        Ok(Self::new(kek).with_tag(TagMode::Signature {
            scheme,
            public_key,
            private_key: Some(private_key),
        }))
    }

    pub fn tag_mode(&self) -> &TagMode {
        &self.tag
    }
}

/// Parsed envelope fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Content key wrapped under the recipient KEK, never the clear key
    pub symmetric_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub integrity_tag: Vec<u8>,
}

fn put_field(out: &mut Vec<u8>, field: &[u8]) -> Result<(), EnvelopeError> {
    let len = u32::try_from(field.len()).map_err(|_| {
        EnvelopeError::Malformed(format!("field of {} bytes exceeds u32 length", field.len()))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(field);
    Ok(())
}

struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn field(&mut self, name: &str) -> Result<&'a [u8], EnvelopeError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Err(EnvelopeError::Malformed(format!(
                "truncated {name} length prefix"
            )));
        }
        let (prefix, rest) = self.buf.split_at(LENGTH_PREFIX_SIZE);
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        len_bytes.copy_from_slice(prefix);
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > rest.len() {
            return Err(EnvelopeError::Malformed(format!(
                "{name} length {len} exceeds remaining {} bytes",
                rest.len()
            )));
        }
        let (field, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(field)
    }
}

impl EncryptedEnvelope {
    /// Serialize into the length-prefixed binary layout
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut out = Vec::with_capacity(
            4 * LENGTH_PREFIX_SIZE
                + self.symmetric_key.len()
                + self.nonce.len()
                + self.ciphertext.len()
                + self.integrity_tag.len(),
        );
        put_field(&mut out, &self.symmetric_key)?;
        put_field(&mut out, &self.nonce)?;
        put_field(&mut out, &self.ciphertext)?;
        put_field(&mut out, &self.integrity_tag)?;
        Ok(out)
    }

    /// Parse the binary layout
    ///
    /// Only structure is checked here; nothing is authenticated.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut reader = FieldReader { buf: bytes };
        let symmetric_key = reader.field("symmetric key")?;
        let nonce = reader.field("nonce")?;
        let ciphertext = reader.field("ciphertext")?;
        let integrity_tag = reader.field("integrity tag")?;
        if !reader.buf.is_empty() {
            return Err(EnvelopeError::Malformed(format!(
                "{} trailing bytes",
                reader.buf.len()
            )));
        }
        if symmetric_key.len() != WRAPPED_KEY_SIZE {
            return Err(EnvelopeError::Malformed(format!(
                "wrapped key must be {WRAPPED_KEY_SIZE} bytes, got {}",
                symmetric_key.len()
            )));
        }
        Ok(Self {
            symmetric_key: symmetric_key.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext: ciphertext.to_vec(),
            integrity_tag: integrity_tag.to_vec(),
        })
    }

    /// Bytes covered by the integrity tag
    fn tag_preimage(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut preimage = Vec::with_capacity(
            TAG_DOMAIN.len()
                + 3 * LENGTH_PREFIX_SIZE
                + self.symmetric_key.len()
                + self.nonce.len()
                + self.ciphertext.len(),
        );
        preimage.extend_from_slice(TAG_DOMAIN);
        put_field(&mut preimage, &self.symmetric_key)?;
        put_field(&mut preimage, &self.nonce)?;
        put_field(&mut preimage, &self.ciphertext)?;
        Ok(preimage)
    }
}

/// Seals documents into [`EncryptedEnvelope`]s and opens them again
///
/// # Examples
///
/// ```ignore
/// let codec: EnvelopeCodec = EnvelopeCodec::default();
/// let recipient = RecipientContext::new(KeyEncryptionKey::derive(b"passphrase"));
///
/// let bytes = codec.seal(b"hello-world", &recipient)?;
/// let document = codec.open(&bytes, &recipient)?;
/// assert_eq!(document, b"hello-world");
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec<C = Aes256GcmCipher> {
    cipher: C,
}

impl<C: SymmetricCipher> EnvelopeCodec<C> {
    pub fn new(cipher: C) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    /// Encrypt `document` for `recipient`
    ///
    /// A fresh content key and nonce are drawn for every call.
    pub fn encrypt(
        &self,
        document: &[u8],
        recipient: &RecipientContext,
    ) -> Result<EncryptedEnvelope, EnvelopeError> {
        let content_key = SymmetricKey::generate()?;
        let nonce = self.cipher.generate_nonce()?;
        let ciphertext = self.cipher.seal(&content_key, &nonce, document)?;
        let wrapped = recipient.kek.wrap(&content_key)?;

        let mut envelope = EncryptedEnvelope {
            symmetric_key: wrapped,
            nonce,
            ciphertext,
            integrity_tag: Vec::new(),
        };
        let preimage = envelope.tag_preimage()?;
        envelope.integrity_tag = match &recipient.tag {
            TagMode::Digest => Sha3_256::digest(&preimage).to_vec(),
            TagMode::Signature {
                scheme,
                private_key,
                ..
            } => {
                let private_key = private_key
                    .as_ref()
                    .ok_or(CryptoError::MissingPrivateKey(scheme.name()))?;
                scheme.sign(private_key, &preimage)?.as_bytes().to_vec()
            }
        };

        tracing::debug!(
            cipher = self.cipher.name(),
            plaintext_len = document.len(),
            ciphertext_len = envelope.ciphertext.len(),
            "sealed envelope"
        );
        Ok(envelope)
    }

    /// Authenticate and decrypt an envelope
    ///
    /// The tag is checked before the content key is unwrapped or the payload
    /// decrypted.
    pub fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        recipient: &RecipientContext,
    ) -> Result<Vec<u8>, EnvelopeError> {
        if envelope.symmetric_key.len() != WRAPPED_KEY_SIZE {
            return Err(EnvelopeError::Malformed(format!(
                "wrapped key must be {WRAPPED_KEY_SIZE} bytes, got {}",
                envelope.symmetric_key.len()
            )));
        }
        if envelope.nonce.len() != self.cipher.nonce_size() {
            return Err(EnvelopeError::Malformed(format!(
                "{} nonce must be {} bytes, got {}",
                self.cipher.name(),
                self.cipher.nonce_size(),
                envelope.nonce.len()
            )));
        }

        let preimage = envelope.tag_preimage()?;
        let tag_ok = match &recipient.tag {
            TagMode::Digest => {
                let expected = Sha3_256::digest(&preimage);
                bool::from(expected.as_slice().ct_eq(&envelope.integrity_tag))
            }
            TagMode::Signature {
                scheme, public_key, ..
            } => {
                let signature = Signature::from(envelope.integrity_tag.clone());
                match scheme.verify(public_key, &preimage, &signature) {
                    Ok(valid) => valid,
                    Err(CryptoError::MalformedSignature { .. }) => false,
                    Err(e) => return Err(e.into()),
                }
            }
        };
        if !tag_ok {
            tracing::warn!("envelope integrity tag mismatch");
            return Err(EnvelopeError::Integrity("tag mismatch"));
        }

        let content_key = recipient
            .kek
            .unwrap(&envelope.symmetric_key)
            .ok_or(EnvelopeError::Integrity("content key unwrap failed"))?;
        self.cipher
            .open(&content_key, &envelope.nonce, &envelope.ciphertext)
            .ok_or(EnvelopeError::Integrity("payload authentication failed"))
    }

    /// [`encrypt`](Self::encrypt) and encode in one step
    pub fn seal(
        &self,
        document: &[u8],
        recipient: &RecipientContext,
    ) -> Result<Vec<u8>, EnvelopeError> {
        self.encrypt(document, recipient)?.encode()
    }

    /// Decode and [`decrypt`](Self::decrypt) in one step
    pub fn open(&self, bytes: &[u8], recipient: &RecipientContext) -> Result<Vec<u8>, EnvelopeError> {
        let envelope = EncryptedEnvelope::decode(bytes)?;
        self.decrypt(&envelope, recipient)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::cipher::ChaCha20Poly1305Cipher;
    use crate::crypto::ml_dsa::MlDsa44;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::default()
    }

    fn digest_recipient() -> RecipientContext {
        RecipientContext::new(KeyEncryptionKey::derive(b"recipient secret"))
    }

    fn signing_recipient() -> RecipientContext {
        let keypair = MlDsa44.generate_keypair().unwrap();
        RecipientContext::for_owner(Arc::new(MlDsa44), Arc::new(keypair.private_key)).unwrap()
    }

    #[test]
    fn test_round_trip_digest_mode() {
        let codec = codec();
        let recipient = digest_recipient();
        for document in [&b""[..], b"hello-world", &[0xAAu8; 4096][..]] {
            let bytes = codec.seal(document, &recipient).unwrap();
            assert_eq!(codec.open(&bytes, &recipient).unwrap(), document);
        }
    }

    #[test]
    fn test_round_trip_signature_mode() {
        let codec = EnvelopeCodec::new(ChaCha20Poly1305Cipher);
        let recipient = signing_recipient();
        let bytes = codec.seal(b"hello-world", &recipient).unwrap();
        assert_eq!(codec.open(&bytes, &recipient).unwrap(), b"hello-world");
    }

    #[test]
    fn test_layout() {
        let codec = codec();
        let envelope = codec.encrypt(b"hello", &digest_recipient()).unwrap();
        assert_eq!(envelope.symmetric_key.len(), WRAPPED_KEY_SIZE);
        assert_eq!(envelope.nonce.len(), 12);
        // AES-GCM appends a 16 byte tag
        assert_eq!(envelope.ciphertext.len(), 5 + 16);
        assert_eq!(envelope.integrity_tag.len(), 32);

        let bytes = envelope.encode().unwrap();
        assert_eq!(&bytes[..4], &(WRAPPED_KEY_SIZE as u32).to_le_bytes());
        assert_eq!(EncryptedEnvelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_fresh_key_and_nonce_per_call() {
        let codec = codec();
        let recipient = digest_recipient();
        let a = codec.encrypt(b"same document", &recipient).unwrap();
        let b = codec.encrypt(b"same document", &recipient).unwrap();
        assert_ne!(a.symmetric_key, b.symmetric_key);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_any_field_bit_flip_is_integrity_error() {
        let codec = codec();
        for recipient in [digest_recipient(), signing_recipient()] {
            let envelope = codec.encrypt(b"hello-world", &recipient).unwrap();
            let fields: [fn(&mut EncryptedEnvelope) -> &mut Vec<u8>; 4] = [
                |e| &mut e.symmetric_key,
                |e| &mut e.nonce,
                |e| &mut e.ciphertext,
                |e| &mut e.integrity_tag,
            ];
            for field in fields {
                let len = field(&mut envelope.clone()).len();
                for i in [0, len / 2, len - 1] {
                    let mut tampered = envelope.clone();
                    field(&mut tampered)[i] ^= 0x01;
                    assert!(matches!(
                        codec.decrypt(&tampered, &recipient),
                        Err(EnvelopeError::Integrity(_))
                    ));
                }
            }
        }
    }

    #[test]
    fn test_wrong_recipient_is_integrity_error() {
        let codec = codec();
        let bytes = codec.seal(b"hello-world", &digest_recipient()).unwrap();
        let other = RecipientContext::new(KeyEncryptionKey::derive(b"someone else"));
        assert!(matches!(
            codec.open(&bytes, &other),
            Err(EnvelopeError::Integrity("content key unwrap failed"))
        ));

        let bytes = codec.seal(b"hello-world", &signing_recipient()).unwrap();
        assert!(matches!(
            codec.open(&bytes, &signing_recipient()),
            Err(EnvelopeError::Integrity("tag mismatch"))
        ));
    }

    #[test]
    fn test_truncation_is_malformed() {
        let codec = codec();
        let recipient = digest_recipient();
        let bytes = codec.seal(b"hello-world", &recipient).unwrap();
        for len in 0..bytes.len() {
            assert!(
                matches!(
                    codec.open(&bytes[..len], &recipient),
                    Err(EnvelopeError::Malformed(_))
                ),
                "truncation to {len} bytes"
            );
        }
    }

    #[test]
    fn test_length_overflow_and_trailing_bytes_are_malformed() {
        let codec = codec();
        let recipient = digest_recipient();
        let mut bytes = codec.seal(b"hello-world", &recipient).unwrap();

        let mut overflow = bytes.clone();
        overflow[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            EncryptedEnvelope::decode(&overflow),
            Err(EnvelopeError::Malformed(_))
        ));

        bytes.push(0);
        assert!(matches!(
            EncryptedEnvelope::decode(&bytes),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_field_sizes_are_malformed() {
        let codec = codec();
        let recipient = digest_recipient();
        let envelope = codec.encrypt(b"hello-world", &recipient).unwrap();

        let mut short_nonce = envelope.clone();
        short_nonce.nonce.truncate(8);
        assert!(matches!(
            codec.decrypt(&short_nonce, &recipient),
            Err(EnvelopeError::Malformed(_))
        ));

        let mut short_key = envelope.clone();
        short_key.symmetric_key.truncate(32);
        assert!(matches!(
            EncryptedEnvelope::decode(&short_key.encode().unwrap()),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_sealing_without_private_key_fails() {
        let keypair = MlDsa44.generate_keypair().unwrap();
        let recipient =
            RecipientContext::new(KeyEncryptionKey::derive(b"k")).with_tag(TagMode::Signature {
                scheme: Arc::new(MlDsa44),
                public_key: keypair.public_key,
                private_key: None,
            });
        let err = codec()
            .encrypt(b"hello", &recipient)
            .unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::Crypto(CryptoError::MissingPrivateKey(_))
        ));
        assert_eq!(err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            EnvelopeError::Malformed("x".into()).kind(),
            ErrorKind::MalformedEnvelope
        );
        assert_eq!(EnvelopeError::Integrity("x").kind(), ErrorKind::Integrity);
    }
}
