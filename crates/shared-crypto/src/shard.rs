//! Identity shards and the root of trust
//!
//! A shard is a tiny certificate binding a public key to an issuer. It travels
//! as base64-encoded JSON `{ publicKey, issuer, issuedAt, sig }`. Shards from
//! members who rotated keys also carry `epoch` and the `retired` keys of
//! earlier epochs, so peers can still check what those keys signed.
//!
//! Two kinds of `sig` exist:
//! - a base64 ECDSA signature by a root key over
//!   `<publicKey>|<issuer>|<issuedAt>`, checked against the configured root
//! - the legacy sentinel [`MOCK_ROOT_SIGNATURE`], which proves nothing and is
//!   only accepted when the anchor explicitly allows it

use crate::error::CryptoError;
use crate::keys::{verify_with_public_key, NotaryIdentity, SigningIdentity};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

/// Issuer name used by the legacy shards
pub const DEFAULT_ISSUER: &str = "AIVoiceCast";

/// Sentinel carried by legacy self-issued shards in place of a signature
pub const MOCK_ROOT_SIGNATURE: &str = "ROOT_SIGNED_HASH_MOCK";

/// A key from an earlier epoch, valid for signatures made before `retired_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorKey {
    pub epoch: u32,
    /// Base64 SPKI public key
    pub public_key: String,
    /// Milliseconds since the Unix epoch
    pub retired_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityShard {
    /// Base64 SPKI public key
    pub public_key: String,
    pub issuer: String,
    /// Milliseconds since the Unix epoch
    pub issued_at: i64,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<PriorKey>,
}

impl IdentityShard {
    /// A shard vouched for only by the legacy sentinel
    pub fn self_issued(public_key: &str, issuer: &str, issued_at: i64) -> Self {
        Self {
            public_key: public_key.to_string(),
            issuer: issuer.to_string(),
            issued_at,
            sig: MOCK_ROOT_SIGNATURE.to_string(),
            epoch: None,
            retired: Vec::new(),
        }
    }

    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_retired(mut self, retired: Vec<PriorKey>) -> Self {
        self.retired = retired;
        self
    }

    /// Bytes a root signs to vouch for this shard.
    ///
    /// `<publicKey>|<issuer>|<issuedAt>`, followed by `|<epoch>` and one
    /// `|<epoch>:<publicKey>:<retiredAt>` per retired key when present.
    pub fn signing_input(&self) -> Vec<u8> {
        let mut input = format!("{}|{}|{}", self.public_key, self.issuer, self.issued_at);
        if let Some(epoch) = self.epoch {
            input.push_str(&format!("|{}", epoch));
        }
        for prior in &self.retired {
            input.push_str(&format!(
                "|{}:{}:{}",
                prior.epoch, prior.public_key, prior.retired_at
            ));
        }
        input.into_bytes()
    }

    pub fn is_mock(&self) -> bool {
        self.sig == MOCK_ROOT_SIGNATURE
    }

    pub fn encode(&self) -> Result<String, CryptoError> {
        let json =
            serde_json::to_vec(self).map_err(|e| CryptoError::MalformedShard(e.to_string()))?;
        Ok(BASE64.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let json = BASE64.decode(encoded.trim())?;
        serde_json::from_slice(&json).map_err(|e| CryptoError::MalformedShard(e.to_string()))
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        crate::keys::decode_public_key(&self.public_key)
    }
}

/// A key that issues root-signed shards
pub struct RootAuthority {
    identity: NotaryIdentity,
    issuer: String,
}

impl RootAuthority {
    pub fn new(identity: NotaryIdentity, issuer: &str) -> Self {
        Self {
            identity,
            issuer: issuer.to_string(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn public_key_base64(&self) -> Result<String, CryptoError> {
        self.identity.public_key_base64()
    }

    /// Issue a shard for `public_key`
    pub fn issue(&self, public_key: &str, issued_at: i64) -> IdentityShard {
        self.vouch(IdentityShard::self_issued(public_key, &self.issuer, issued_at))
    }

    /// Re-issue `shard` under this root, keeping its key material
    pub fn vouch(&self, mut shard: IdentityShard) -> IdentityShard {
        shard.issuer = self.issuer.clone();
        shard.sig = self.identity.sign_base64(&shard.signing_input());
        shard
    }
}

/// How a shard earned trust
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Signature checked against the configured root key
    RootSigned,
    /// Legacy sentinel accepted by configuration
    MockSentinel,
}

/// Decides whether an imported shard is trusted
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    issuer: String,
    root_key: Option<VerifyingKey>,
    accept_mock: bool,
}

impl TrustAnchor {
    pub fn new(issuer: &str, root_key: Option<VerifyingKey>, accept_mock: bool) -> Self {
        Self {
            issuer: issuer.to_string(),
            root_key,
            accept_mock,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn check(&self, shard: &IdentityShard) -> Result<TrustDecision, CryptoError> {
        if shard.issuer != self.issuer {
            return Err(CryptoError::UntrustedShard(format!(
                "unknown issuer '{}'",
                shard.issuer
            )));
        }

        if shard.is_mock() {
            if self.accept_mock {
                tracing::warn!(
                    issuer = %shard.issuer,
                    "Accepting identity shard vouched for by the mock root sentinel"
                );
                return Ok(TrustDecision::MockSentinel);
            }
            return Err(CryptoError::UntrustedShard(
                "mock root sentinel is not accepted".to_string(),
            ));
        }

        let root_key = self.root_key.as_ref().ok_or_else(|| {
            CryptoError::UntrustedShard("no root public key configured".to_string())
        })?;

        if verify_with_public_key(root_key, &shard.signing_input(), &shard.sig)? {
            Ok(TrustDecision::RootSigned)
        } else {
            Err(CryptoError::UntrustedShard(
                "root signature does not verify".to_string(),
            ))
        }
    }
}
