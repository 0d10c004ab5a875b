//! P-256 notary identities
//!
//! Signatures are produced in the fixed-width `r || s` form (64 bytes) that
//! Web Crypto emits for ECDSA, base64-encoded when they travel inside a
//! certificate. Verification also accepts DER so older artifacts keep working.

use crate::error::CryptoError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    pkcs8::{DecodePublicKey, EncodePublicKey},
    SecretKey,
};
use sha2::{Digest, Sha256};

/// Trait for any identity that can sign notarization payloads
pub trait SigningIdentity {
    /// Get the public key as SPKI DER bytes
    fn public_key_spki(&self) -> Result<Vec<u8>, CryptoError>;

    /// Get the public key as base64 SPKI, the form published to profiles
    fn public_key_base64(&self) -> Result<String, CryptoError> {
        Ok(BASE64.encode(self.public_key_spki()?))
    }

    /// Sign raw data (ECDSA/SHA-256) and return the `r || s` signature
    fn sign(&self, data: &[u8]) -> Vec<u8>;

    /// Sign and return the base64 signature
    fn sign_base64(&self, data: &[u8]) -> String {
        BASE64.encode(self.sign(data))
    }

    /// Verify a signature
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;
}

/// A locally held ECDSA P-256 key pair
pub struct NotaryIdentity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl NotaryIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut rand_core::OsRng);
        let signing_key = SigningKey::from(&secret_key);
        let verifying_key = VerifyingKey::from(&signing_key);

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Import from a previously exported private scalar
    pub fn from_private_key(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        let signing_key = SigningKey::from(&secret_key);
        let verifying_key = VerifyingKey::from(&signing_key);

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Import from a hex-encoded private scalar
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes =
            hex::decode(hex_key).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_private_key(&bytes)
    }

    /// Export the private scalar for the local key store.
    /// WARNING: this exposes the private key; it must never leave the device.
    pub fn export_private_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    pub fn export_private_key_hex(&self) -> String {
        hex::encode(self.export_private_key())
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

impl SigningIdentity for NotaryIdentity {
    fn public_key_spki(&self) -> Result<Vec<u8>, CryptoError> {
        self.verifying_key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_bytes().to_vec()
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match parse_signature(signature) {
            Ok(sig) => self.verifying_key.verify(data, &sig).is_ok(),
            Err(_) => false,
        }
    }
}

/// Decode a base64 public key, SPKI DER or a raw SEC1 point
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = BASE64.decode(encoded.trim())?;
    VerifyingKey::from_public_key_der(&bytes)
        .or_else(|_| VerifyingKey::from_sec1_bytes(&bytes))
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Verify a base64 signature against a public key.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and
/// `Err` when the signature cannot even be decoded.
pub fn verify_with_public_key(
    key: &VerifyingKey,
    data: &[u8],
    signature_b64: &str,
) -> Result<bool, CryptoError> {
    let bytes = BASE64.decode(signature_b64.trim())?;
    let signature = parse_signature(&bytes)?;
    Ok(key.verify(data, &signature).is_ok())
}

fn parse_signature(bytes: &[u8]) -> Result<Signature, CryptoError> {
    let parsed = if bytes.len() == 64 {
        Signature::from_slice(bytes)
    } else {
        Signature::from_der(bytes)
    };
    parsed.map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

/// Hash data using SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: Any message can be signed and the signature verifies
        #[test]
        fn sign_verify_roundtrip(message in prop::collection::vec(any::<u8>(), 0..1024)) {
            let identity = NotaryIdentity::generate();
            let signature = identity.sign(&message);
            prop_assert!(identity.verify(&message, &signature));
        }

        /// Property: Signature from key A does not verify with key B
        #[test]
        fn cross_key_verification_fails(message in prop::collection::vec(any::<u8>(), 1..512)) {
            let a = NotaryIdentity::generate();
            let b = NotaryIdentity::generate();
            let signature = a.sign_base64(&message);
            prop_assert!(!verify_with_public_key(b.verifying_key(), &message, &signature).unwrap());
        }

        /// Property: Random garbage never verifies
        #[test]
        fn garbage_signature_fails(
            message in prop::collection::vec(any::<u8>(), 1..256),
            garbage in prop::collection::vec(any::<u8>(), 0..100),
        ) {
            let identity = NotaryIdentity::generate();
            prop_assert!(!identity.verify(&message, &garbage));
        }

        /// Property: SHA-256 produces deterministic 32-byte output
        #[test]
        fn sha256_deterministic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            prop_assert_eq!(sha256(&data), sha256(&data));
            prop_assert_eq!(sha256_hex(&data).len(), 64);
        }

        /// Property: Wrong-length private keys are rejected
        #[test]
        fn bad_private_key_rejected(bad_key in prop::collection::vec(any::<u8>(), 0..10)) {
            prop_assert!(NotaryIdentity::from_private_key(&bad_key).is_err());
        }
    }
}
