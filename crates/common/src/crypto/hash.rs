//! Canonical document fingerprinting
//!
//! A fingerprint is the SHA3-256 digest of the exact document bytes. It is the
//! only hashing rule for fingerprints; registration and verification never mix
//! algorithms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};

use crate::error::{Categorize, ErrorKind};

/// Size of a fingerprint in bytes (256 bits)
pub const FINGERPRINT_SIZE: usize = 32;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("fingerprint hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid fingerprint size, expected {FINGERPRINT_SIZE}, got {0}")]
    Size(usize),
}

impl Categorize for FingerprintError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Hash a document into its canonical fingerprint
///
/// Pure and total: defined for the empty document too.
pub fn hash(document: &[u8]) -> Fingerprint {
    let digest = Sha3_256::digest(document);
    let mut bytes = [0u8; FINGERPRINT_SIZE];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

/// Fixed-length SHA3-256 digest identifying a document's exact content
///
/// Serialized as lowercase hex everywhere it crosses a text boundary
/// (registry file, ledger journal, CLI output).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Fingerprint of the given document bytes, same as [`hash`]
    pub fn of(document: &[u8]) -> Self {
        hash(document)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a fingerprint from hex, with or without a `0x` prefix
    pub fn from_hex(hex: &str) -> Result<Self, FingerprintError> {
        let hex = hex.trim();
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        Self::try_from(bytes.as_slice())
    }
}

impl From<[u8; FINGERPRINT_SIZE]> for Fingerprint {
    fn from(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Fingerprint(bytes)
    }
}

impl TryFrom<&[u8]> for Fingerprint {
    type Error = FingerprintError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; FINGERPRINT_SIZE] = bytes
            .try_into()
            .map_err(|_| FingerprintError::Size(bytes.len()))?;
        Ok(Fingerprint(bytes))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
