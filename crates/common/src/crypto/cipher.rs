//! Symmetric AEAD ciphers for envelope payloads
//!
//! Every envelope gets its own [`SymmetricKey`] and its own random nonce, so a
//! key is never used for more than one message.

use std::ops::Deref;
use std::sync::Arc;

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::scheme::CryptoError;

/// Size of a symmetric content key in bytes (256 bits)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// A 256-bit content key, zeroized on drop
///
/// # Examples
///
/// ```ignore
/// let key = SymmetricKey::generate()?;
/// let cipher = Aes256GcmCipher;
/// let nonce = cipher.generate_nonce()?;
/// let ciphertext = cipher.seal(&key, &nonce, b"sensitive data")?;
/// let recovered = cipher.open(&key, &nonce, &ciphertext);
/// ```
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl Deref for SymmetricKey {
    type Target = [u8; SYMMETRIC_KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SYMMETRIC_KEY_SIZE]> for SymmetricKey {
    fn from(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        SymmetricKey(bytes)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl SymmetricKey {
    /// Generate a new random key using the OS CSPRNG
    pub fn generate() -> Result<Self, CryptoError> {
        let mut buff = [0; SYMMETRIC_KEY_SIZE];
        fill_random(&mut buff)?;
        Ok(Self(buff))
    }

    /// Create a key from a byte slice of exactly [`SYMMETRIC_KEY_SIZE`] bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != SYMMETRIC_KEY_SIZE {
            return Err(CryptoError::SymmetricKeySize {
                expected: SYMMETRIC_KEY_SIZE,
                got: data.len(),
            });
        }
        let mut buff = [0; SYMMETRIC_KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

pub(crate) fn fill_random(buff: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buff).map_err(|e| CryptoError::Random(e.to_string()))
}

/// Authenticated symmetric encryption with an explicit nonce
pub trait SymmetricCipher: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Nonce length this cipher requires
    fn nonce_size(&self) -> usize;

    /// Fresh random nonce of [`nonce_size`](Self::nonce_size) bytes
    fn generate_nonce(&self) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = vec![0u8; self.nonce_size()];
        fill_random(&mut nonce)?;
        Ok(nonce)
    }

    /// Encrypt and authenticate `plaintext`; output carries the AEAD tag
    ///
    /// `nonce` must be exactly [`nonce_size`](Self::nonce_size) bytes.
    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `ciphertext`, returning `None` if authentication fails
    ///
    /// `nonce` must be exactly [`nonce_size`](Self::nonce_size) bytes.
    fn open(&self, key: &SymmetricKey, nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>>;
}

impl<T: SymmetricCipher + ?Sized> SymmetricCipher for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn nonce_size(&self) -> usize {
        (**self).nonce_size()
    }

    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        (**self).seal(key, nonce, plaintext)
    }

    fn open(&self, key: &SymmetricKey, nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        (**self).open(key, nonce, ciphertext)
    }
}

/// AES-256-GCM, the default payload cipher
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl Aes256GcmCipher {
    pub const NAME: &'static str = "aes-256-gcm";
    pub const NONCE_SIZE: usize = 12;
}

impl SymmetricCipher for Aes256GcmCipher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn nonce_size(&self) -> usize {
        Self::NONCE_SIZE
    }

    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(key.bytes()));
        cipher
            .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::Encrypt(Self::NAME))
    }

    fn open(&self, key: &SymmetricKey, nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(key.bytes()));
        cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
            .ok()
    }
}

/// ChaCha20-Poly1305, for hosts without AES acceleration
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaCha20Poly1305Cipher;

impl ChaCha20Poly1305Cipher {
    pub const NAME: &'static str = "chacha20-poly1305";
    pub const NONCE_SIZE: usize = 12;
}

impl SymmetricCipher for ChaCha20Poly1305Cipher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn nonce_size(&self) -> usize {
        Self::NONCE_SIZE
    }

    fn seal(
        &self,
        key: &SymmetricKey,
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.bytes()));
        cipher
            .encrypt(chacha20poly1305::Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::Encrypt(Self::NAME))
    }

    fn open(&self, key: &SymmetricKey, nonce: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.bytes()));
        cipher
            .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
            .ok()
    }
}

/// Resolve a configured cipher name (case-insensitive)
pub fn cipher_by_name(name: &str) -> Result<Arc<dyn SymmetricCipher>, CryptoError> {
    match name.trim().to_ascii_lowercase().as_str() {
        Aes256GcmCipher::NAME => Ok(Arc::new(Aes256GcmCipher)),
        ChaCha20Poly1305Cipher::NAME => Ok(Arc::new(ChaCha20Poly1305Cipher)),
        _ => Err(CryptoError::UnknownCipher(name.to_string())),
    }
}
