//! ML-DSA (FIPS 204) signature schemes
//!
//! Backed by the pure-Rust `fips204` crate. Both parameter sets share one
//! implementation, generated by `ml_dsa_scheme!`. Signatures use the empty
//! context string.

use super::keys::{KeyPair, PrivateKey, PublicKey, Signature};
use super::scheme::{CryptoError, SignatureScheme};

macro_rules! ml_dsa_scheme {
    (
        $(#[$meta:meta])*
        $scheme:ident, $module:ident, $name:literal,
        pk: $pk_len:literal, sk: $sk_len:literal, sig: $sig_len:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $scheme;

        impl $scheme {
            pub const NAME: &'static str = $name;
            pub const PUBLIC_KEY_SIZE: usize = $pk_len;
            pub const PRIVATE_KEY_SIZE: usize = $sk_len;
            pub const SIGNATURE_SIZE: usize = $sig_len;

            fn parse_private_key(
                private_key: &PrivateKey,
            ) -> Result<fips204::$module::PrivateKey, CryptoError> {
                use fips204::traits::SerDes;

                let bytes = private_key.as_bytes();
                let sk_array: [u8; $sk_len] =
                    bytes
                        .try_into()
                        .map_err(|_| CryptoError::MalformedPrivateKey {
                            scheme: Self::NAME,
                            expected: Self::PRIVATE_KEY_SIZE,
                            got: bytes.len(),
                        })?;
                fips204::$module::PrivateKey::try_from_bytes(sk_array).map_err(|e| {
                    CryptoError::InvalidKey {
                        scheme: Self::NAME,
                        reason: e.to_string(),
                    }
                })
            }

            fn parse_public_key(
                public_key: &PublicKey,
            ) -> Result<fips204::$module::PublicKey, CryptoError> {
                use fips204::traits::SerDes;

                let bytes = public_key.as_bytes();
                let pk_array: [u8; $pk_len] =
                    bytes
                        .try_into()
                        .map_err(|_| CryptoError::MalformedPublicKey {
                            scheme: Self::NAME,
                            expected: Self::PUBLIC_KEY_SIZE,
                            got: bytes.len(),
                        })?;
                fips204::$module::PublicKey::try_from_bytes(pk_array).map_err(|e| {
                    CryptoError::InvalidKey {
                        scheme: Self::NAME,
                        reason: e.to_string(),
                    }
                })
            }
        }

        impl SignatureScheme for $scheme {
            fn name(&self) -> &'static str {
                Self::NAME
            }

            fn generate_keypair(&self) -> Result<KeyPair, CryptoError> {
                use fips204::traits::SerDes;

                let (pk, sk) =
                    fips204::$module::try_keygen().map_err(|e| CryptoError::KeyGeneration {
                        scheme: Self::NAME,
                        reason: e.to_string(),
                    })?;
                Ok(KeyPair {
                    public_key: PublicKey::from(pk.into_bytes().to_vec()),
                    private_key: PrivateKey::from(sk.into_bytes().to_vec()),
                })
            }

            fn sign(
                &self,
                private_key: &PrivateKey,
                message: &[u8],
            ) -> Result<Signature, CryptoError> {
                use fips204::traits::Signer;

                let secret_key = Self::parse_private_key(private_key)?;
                let signature =
                    secret_key
                        .try_sign(message, &[])
                        .map_err(|e| CryptoError::Signing {
                            scheme: Self::NAME,
                            reason: e.to_string(),
                        })?;
                Ok(Signature::from(signature.to_vec()))
            }

            fn verify(
                &self,
                public_key: &PublicKey,
                message: &[u8],
                signature: &Signature,
            ) -> Result<bool, CryptoError> {
                use fips204::traits::Verifier;

                let public_key = Self::parse_public_key(public_key)?;
                let bytes = signature.as_bytes();
                let sig_array: [u8; $sig_len] =
                    bytes
                        .try_into()
                        .map_err(|_| CryptoError::MalformedSignature {
                            scheme: Self::NAME,
                            expected: Self::SIGNATURE_SIZE,
                            got: bytes.len(),
                        })?;
                Ok(public_key.verify(message, &sig_array, &[]))
            }

            fn public_key(&self, private_key: &PrivateKey) -> Result<PublicKey, CryptoError> {
                use fips204::traits::{SerDes, Signer};

                let secret_key = Self::parse_private_key(private_key)?;
                Ok(PublicKey::from(
                    secret_key.get_public_key().into_bytes().to_vec(),
                ))
            }
        }
    };
}

ml_dsa_scheme!(
    /// ML-DSA-44 (NIST security category 2), the default scheme
    MlDsa44, ml_dsa_44, "ml-dsa-44",
    pk: 1312, sk: 2560, sig: 2420
);

ml_dsa_scheme!(
    /// ML-DSA-65 (NIST security category 3)
    MlDsa65, ml_dsa_65, "ml-dsa-65",
    pk: 1952, sk: 4032, sig: 3309
);
