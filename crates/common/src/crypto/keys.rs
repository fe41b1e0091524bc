use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Categorize, ErrorKind};

/// Number of digest bytes kept for a [`SignerId`]
pub const SIGNER_ID_SIZE: usize = 20;

/// Errors that can occur while encoding or decoding key material
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to parse PEM: {0}")]
    Pem(#[from] pem::PemError),
    #[error("invalid PEM tag, expected {expected}, got {found}")]
    Tag { expected: String, found: String },
    #[error("key hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl Categorize for KeyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Crypto
    }
}

fn pem_tag(scheme: &str, kind: &str) -> String {
    format!("{} {}", scheme.to_ascii_uppercase(), kind)
}

/// Split a PEM tag like `ML-DSA-44 PUBLIC KEY` into its lowercase scheme name
fn scheme_from_tag(tag: &str, kind: &str) -> Option<String> {
    tag.strip_suffix(kind)
        .map(|scheme| scheme.trim().to_ascii_lowercase())
        .filter(|scheme| !scheme.is_empty())
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, KeyError> {
    let hex = hex.trim();
    Ok(hex::decode(hex.strip_prefix("0x").unwrap_or(hex))?)
}

/// Public half of a signature scheme keypair
///
/// Opaque, scheme-specific bytes. Whether they actually decode as a key is only
/// checked by the scheme that consumes them.
///
/// # Examples
///
/// ```ignore
/// let keypair = MlDsa44.generate_keypair()?;
///
/// // Persist next to the document
/// let pem = keypair.public_key.to_pem(MlDsa44::NAME);
/// let (scheme, recovered) = PublicKey::from_pem(&pem)?;
/// assert_eq!(scheme, "ml-dsa-44");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a public key from hex, with or without a `0x` prefix
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self(decode_hex(hex)?))
    }

    /// Encode as PEM with tag `<SCHEME> PUBLIC KEY`
    pub fn to_pem(&self, scheme: &str) -> String {
        pem::encode(&pem::Pem::new(pem_tag(scheme, "PUBLIC KEY"), self.0.clone()))
    }

    /// Parse a PEM public key, returning the scheme named by its tag
    pub fn from_pem(pem_str: &str) -> Result<(String, Self), KeyError> {
        let pem = pem::parse(pem_str)?;
        let scheme = scheme_from_tag(pem.tag(), "PUBLIC KEY").ok_or_else(|| KeyError::Tag {
            expected: "<SCHEME> PUBLIC KEY".to_string(),
            found: pem.tag().to_string(),
        })?;
        Ok((scheme, Self(pem.into_contents())))
    }

    /// Short identity for the holder of this key
    pub fn signer_id(&self) -> SignerId {
        let digest = Sha3_256::digest(&self.0);
        let mut bytes = [0u8; SIGNER_ID_SIZE];
        bytes.copy_from_slice(&digest[..SIGNER_ID_SIZE]);
        SignerId(bytes)
    }
}

impl From<Vec<u8>> for PublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}, {} bytes)", self.signer_id(), self.0.len())
    }
}

/// Private half of a signature scheme keypair
///
/// # Security Considerations
///
/// - Zeroized when dropped
/// - Not `Clone`; share it behind an `Arc` when several tasks need it
/// - `Debug` never prints key bytes
/// - Must never be written anywhere but the owner's key file
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as PEM with tag `<SCHEME> PRIVATE KEY`
    pub fn to_pem(&self, scheme: &str) -> String {
        pem::encode(&pem::Pem::new(pem_tag(scheme, "PRIVATE KEY"), self.0.clone()))
    }

    /// Parse a PEM private key, returning the scheme named by its tag
    pub fn from_pem(pem_str: &str) -> Result<(String, Self), KeyError> {
        let pem = pem::parse(pem_str)?;
        let scheme = scheme_from_tag(pem.tag(), "PRIVATE KEY").ok_or_else(|| KeyError::Tag {
            expected: "<SCHEME> PRIVATE KEY".to_string(),
            found: pem.tag().to_string(),
        })?;
        Ok((scheme, Self(pem.into_contents())))
    }
}

impl From<Vec<u8>> for PrivateKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted>, {} bytes)", self.0.len())
    }
}

/// Detached signature over the exact bytes of a document
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        Ok(Self(decode_hex(hex)?))
    }
}

impl From<Vec<u8>> for Signature {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Keypair produced by a [`SignatureScheme`](super::SignatureScheme)
#[derive(Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// `0x`-prefixed identity derived from a public key (first 20 bytes of its SHA3-256)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignerId([u8; SIGNER_ID_SIZE]);

impl SignerId {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for SignerId {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        let bytes: [u8; SIGNER_ID_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::Hex(hex::FromHexError::InvalidStringLength))?;
        Ok(SignerId(bytes))
    }
}

impl Serialize for SignerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
