//! Trusted identities registry
//!
//! Peers' public keys imported out of band. Verification prefers a key found
//! here over the one a certificate carries about itself. Each entry keeps the
//! keys of earlier epochs too, so a peer's rotation doesn't void what they
//! signed before it.

use crate::error::{validate_signer_id, NotaryError};
use crate::keystore::{KeyStore, TrustedIdentity};
use shared_crypto::{IdentityShard, PriorKey, TrustAnchor, TrustDecision};
use std::collections::BTreeMap;
use tracing::info;

/// Read access to trusted keys during verification
pub trait TrustLookup {
    fn lookup(&self, uid: &str) -> Result<Option<TrustedIdentity>, NotaryError>;
}

pub struct TrustRegistry<'a> {
    store: &'a dyn KeyStore,
    anchor: TrustAnchor,
}

impl<'a> TrustRegistry<'a> {
    pub fn new(store: &'a dyn KeyStore, anchor: TrustAnchor) -> Self {
        Self { store, anchor }
    }

    /// Admit a peer's pasted shard under `uid`.
    ///
    /// Re-importing the same key keeps an existing revocation. A key from a
    /// later epoch becomes current and the replaced one is kept as retired
    /// from the new key's issue time. A shard from an earlier epoch than the
    /// trusted one is refused.
    pub fn import_identity(
        &self,
        uid: &str,
        shard_base64: &str,
        now_ms: i64,
    ) -> Result<TrustedIdentity, NotaryError> {
        validate_signer_id(uid)?;

        let shard = IdentityShard::decode(shard_base64)
            .map_err(|e| NotaryError::TrustAnchorRejected(e.to_string()))?;
        shard
            .verifying_key()
            .map_err(|e| NotaryError::TrustAnchorRejected(e.to_string()))?;
        let decision = self
            .anchor
            .check(&shard)
            .map_err(|e| NotaryError::TrustAnchorRejected(e.to_string()))?;

        let existing = self.store.load_trusted(uid)?;
        if let (Some(trusted), Some(incoming)) =
            (existing.as_ref().and_then(|e| e.epoch), shard.epoch)
        {
            if incoming < trusted {
                return Err(NotaryError::TrustAnchorRejected(format!(
                    "shard is for epoch {} but epoch {} is already trusted",
                    incoming, trusted
                )));
            }
        }

        let mut revoked_at_ms = None;
        let mut retired: BTreeMap<u32, PriorKey> = BTreeMap::new();
        if let Some(existing) = existing {
            retired.extend(existing.retired.into_iter().map(|k| (k.epoch, k)));
            if existing.public_key == shard.public_key {
                revoked_at_ms = existing.revoked_at_ms;
            } else if let (Some(old), Some(new)) = (existing.epoch, shard.epoch) {
                if old < new {
                    let retired_at = existing
                        .revoked_at_ms
                        .map_or(shard.issued_at, |r| r.min(shard.issued_at));
                    retired.insert(
                        old,
                        PriorKey {
                            epoch: old,
                            public_key: existing.public_key,
                            retired_at,
                        },
                    );
                }
            }
        }
        for prior in &shard.retired {
            match retired.get_mut(&prior.epoch) {
                Some(known) if known.public_key == prior.public_key => {
                    known.retired_at = known.retired_at.min(prior.retired_at);
                }
                Some(_) => {}
                None => {
                    retired.insert(prior.epoch, prior.clone());
                }
            }
        }
        if let Some(epoch) = shard.epoch {
            retired.retain(|e, _| *e < epoch);
        }

        let entry = TrustedIdentity {
            uid: uid.to_string(),
            shard: shard_base64.trim().to_string(),
            public_key: shard.public_key,
            issuer: shard.issuer,
            imported_at_ms: now_ms,
            revoked_at_ms,
            epoch: shard.epoch,
            retired: retired.into_values().collect(),
        };
        self.store.save_trusted(&entry)?;

        let via = match decision {
            TrustDecision::RootSigned => "root signature",
            TrustDecision::MockSentinel => "mock sentinel",
        };
        info!(
            uid,
            via,
            epoch = entry.epoch,
            retired = entry.retired.len(),
            "Imported trusted identity"
        );
        Ok(entry)
    }

    /// Mark a peer key as revoked from `at_ms` on
    pub fn revoke_identity(&self, uid: &str, at_ms: i64) -> Result<TrustedIdentity, NotaryError> {
        let mut entry = self
            .store
            .load_trusted(uid)?
            .ok_or_else(|| NotaryError::UnknownIdentity(uid.to_string()))?;
        entry.revoked_at_ms = Some(match entry.revoked_at_ms {
            // An earlier revocation stands
            Some(existing) => existing.min(at_ms),
            None => at_ms,
        });
        self.store.save_trusted(&entry)?;
        info!(uid, revoked_at_ms = entry.revoked_at_ms, "Revoked trusted identity");
        Ok(entry)
    }

    pub fn trusted_identities(&self) -> Result<Vec<TrustedIdentity>, NotaryError> {
        self.store.list_trusted()
    }
}

impl TrustLookup for TrustRegistry<'_> {
    fn lookup(&self, uid: &str) -> Result<Option<TrustedIdentity>, NotaryError> {
        self.store.load_trusted(uid)
    }
}

/// A registry with nothing in it
pub struct NoTrustedIdentities;

impl TrustLookup for NoTrustedIdentities {
    fn lookup(&self, _uid: &str) -> Result<Option<TrustedIdentity>, NotaryError> {
        Ok(None)
    }
}
