//! Identity provisioning
//!
//! Every member gets one P-256 key pair on first use. The private key stays in
//! the [`KeyStore`]; the public key is published to the member's profile so
//! peers can find it. Keys are never replaced implicitly: only
//! [`rotate_identity`] moves a member to a new epoch.

use crate::collab::ProfileStore;
use crate::error::{validate_signer_id, NotaryError};
use crate::keystore::{KeyStore, RetiredKey, StoredIdentity};
use shared_crypto::{IdentityShard, NotaryIdentity, PriorKey, RootAuthority, SigningIdentity};
use tracing::{info, warn};

/// A member's loaded signing identity
pub struct MemberIdentity {
    uid: String,
    epoch: u32,
    created_at_ms: i64,
    public_key: String,
    key: NotaryIdentity,
}

impl MemberIdentity {
    fn from_stored(stored: &StoredIdentity) -> Result<Self, NotaryError> {
        Ok(Self {
            uid: stored.uid.clone(),
            epoch: stored.epoch,
            created_at_ms: stored.created_at_ms,
            public_key: stored.public_key.clone(),
            key: stored.signing_identity()?,
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    /// Base64 SPKI
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn signing_key(&self) -> &NotaryIdentity {
        &self.key
    }

    /// Shard vouched for only by the legacy mock sentinel
    pub fn self_issued_shard(&self, issuer: &str) -> IdentityShard {
        IdentityShard::self_issued(&self.public_key, issuer, self.created_at_ms)
            .with_epoch(self.epoch)
    }
}

impl std::fmt::Debug for MemberIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberIdentity")
            .field("uid", &self.uid)
            .field("epoch", &self.epoch)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

fn new_stored(uid: &str, epoch: u32, now_ms: i64) -> Result<StoredIdentity, NotaryError> {
    let key = NotaryIdentity::generate();
    let public_key = key
        .public_key_base64()
        .map_err(|e| NotaryError::IdentityUnavailable(e.to_string()))?;
    Ok(StoredIdentity {
        uid: uid.to_string(),
        private_key_hex: key.export_private_key_hex(),
        public_key,
        epoch,
        created_at_ms: now_ms,
        retired: Vec::new(),
    })
}

fn publish(profiles: &dyn ProfileStore, identity: &MemberIdentity) -> Result<(), NotaryError> {
    let current = profiles
        .get_profile(identity.uid())?
        .and_then(|p| p.public_key);
    if current.as_deref() != Some(identity.public_key()) {
        profiles.publish_public_key(identity.uid(), identity.public_key())?;
        info!(uid = identity.uid(), epoch = identity.epoch(), "Published public key");
    }
    Ok(())
}

/// Load the member's key, generating and publishing one on first use.
///
/// Calling this again for the same uid returns the same key.
pub fn ensure_identity(
    store: &dyn KeyStore,
    profiles: &dyn ProfileStore,
    uid: &str,
    now_ms: i64,
) -> Result<MemberIdentity, NotaryError> {
    validate_signer_id(uid)?;

    let stored = match store
        .load_identity(uid)
        .map_err(|e| NotaryError::IdentityUnavailable(e.to_string()))?
    {
        Some(stored) => stored,
        None => {
            let stored = new_stored(uid, 1, now_ms)?;
            store
                .save_identity(&stored)
                .map_err(|e| NotaryError::IdentityUnavailable(e.to_string()))?;
            info!(uid, "Provisioned new signing identity");
            stored
        }
    };

    let identity = MemberIdentity::from_stored(&stored)?;
    if let Err(e) = publish(profiles, &identity) {
        // The local key is usable even if the profile is stale
        warn!(uid, "Failed to publish public key: {}", e);
    }
    Ok(identity)
}

/// Retire the current key and start a new epoch
pub fn rotate_identity(
    store: &dyn KeyStore,
    profiles: &dyn ProfileStore,
    uid: &str,
    now_ms: i64,
) -> Result<MemberIdentity, NotaryError> {
    let current = store
        .load_identity(uid)?
        .ok_or_else(|| NotaryError::UnknownIdentity(uid.to_string()))?;

    let mut next = new_stored(uid, current.epoch + 1, now_ms)?;
    next.retired = current.retired.clone();
    next.retired.push(RetiredKey {
        epoch: current.epoch,
        public_key: current.public_key.clone(),
        created_at_ms: current.created_at_ms,
        retired_at_ms: now_ms,
    });
    store.save_identity(&next)?;
    info!(uid, epoch = next.epoch, "Rotated signing identity");

    let identity = MemberIdentity::from_stored(&next)?;
    publish(profiles, &identity)?;
    Ok(identity)
}

/// Encode the member's public key as a shard for peers to import.
///
/// The shard names the current epoch and lists every retired key, so peers
/// importing it can still check documents signed before a rotation. With a
/// root authority the shard is root-signed; without one it carries the legacy
/// mock sentinel under `issuer`.
pub fn export_identity(
    store: &dyn KeyStore,
    uid: &str,
    issuer: &str,
    root: Option<&RootAuthority>,
) -> Result<String, NotaryError> {
    let stored = store
        .load_identity(uid)?
        .ok_or_else(|| NotaryError::UnknownIdentity(uid.to_string()))?;
    let identity = MemberIdentity::from_stored(&stored)?;

    let retired = stored
        .retired
        .iter()
        .map(|key| PriorKey {
            epoch: key.epoch,
            public_key: key.public_key.clone(),
            retired_at: key.retired_at_ms,
        })
        .collect();
    let shard = identity.self_issued_shard(issuer).with_retired(retired);
    let shard = match root {
        Some(root) => root.vouch(shard),
        None => shard,
    };
    Ok(shard.encode()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryProfileStore;
    use crate::keystore::MemoryKeyStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ensure_identity_is_idempotent() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();

        let first = ensure_identity(&store, &profiles, "U1", 1_000).unwrap();
        let second = ensure_identity(&store, &profiles, "U1", 2_000).unwrap();

        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(second.created_at_ms(), 1_000);
        assert_eq!(second.epoch(), 1);
    }

    #[test]
    fn test_ensure_identity_publishes_public_key() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        let identity = ensure_identity(&store, &profiles, "U1", 1_000).unwrap();

        let profile = profiles.get_profile("U1").unwrap().unwrap();
        assert_eq!(profile.public_key.as_deref(), Some(identity.public_key()));
    }

    #[test]
    fn test_distinct_members_get_distinct_keys() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        let a = ensure_identity(&store, &profiles, "alice", 1).unwrap();
        let b = ensure_identity(&store, &profiles, "bob", 1).unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_invalid_uid_is_rejected() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        assert!(matches!(
            ensure_identity(&store, &profiles, "a|b", 1),
            Err(NotaryError::InvalidSignerId(_))
        ));
    }

    #[test]
    fn test_rotation_advances_epoch_and_retires_old_key() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        let original = ensure_identity(&store, &profiles, "U1", 1_000).unwrap();

        let rotated = rotate_identity(&store, &profiles, "U1", 5_000).unwrap();
        assert_eq!(rotated.epoch(), 2);
        assert_ne!(rotated.public_key(), original.public_key());

        let stored = store.load_identity("U1").unwrap().unwrap();
        assert_eq!(stored.retired.len(), 1);
        assert_eq!(stored.retired[0].public_key, original.public_key());
        assert_eq!(stored.retired[0].retired_at_ms, 5_000);

        let profile = profiles.get_profile("U1").unwrap().unwrap();
        assert_eq!(profile.public_key.as_deref(), Some(rotated.public_key()));
    }

    #[test]
    fn test_rotating_unknown_member_fails() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        assert!(matches!(
            rotate_identity(&store, &profiles, "ghost", 1),
            Err(NotaryError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_export_self_issued_shard() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        let identity = ensure_identity(&store, &profiles, "U1", 1_000).unwrap();

        let encoded = export_identity(&store, "U1", "AIVoiceCast", None).unwrap();
        let shard = IdentityShard::decode(&encoded).unwrap();
        assert_eq!(shard.public_key, identity.public_key());
        assert_eq!(shard.issuer, "AIVoiceCast");
        assert_eq!(shard.issued_at, 1_000);
        assert_eq!(shard.epoch, Some(1));
        assert!(shard.retired.is_empty());
        assert!(shard.is_mock());
    }

    #[test]
    fn test_export_after_rotation_lists_retired_keys() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        let original = ensure_identity(&store, &profiles, "U1", 1_000).unwrap();
        let rotated = rotate_identity(&store, &profiles, "U1", 5_000).unwrap();

        let shard = IdentityShard::decode(&export_identity(&store, "U1", "AIVoiceCast", None).unwrap())
            .unwrap();
        assert_eq!(shard.public_key, rotated.public_key());
        assert_eq!(shard.issued_at, 5_000);
        assert_eq!(shard.epoch, Some(2));
        assert_eq!(
            shard.retired,
            vec![PriorKey {
                epoch: 1,
                public_key: original.public_key().to_string(),
                retired_at: 5_000,
            }]
        );
    }

    #[test]
    fn test_export_root_signed_shard() {
        let store = MemoryKeyStore::new();
        let profiles = MemoryProfileStore::new();
        ensure_identity(&store, &profiles, "U1", 1_000).unwrap();

        let root = RootAuthority::new(NotaryIdentity::generate(), "ExampleRoot");
        let encoded = export_identity(&store, "U1", "ignored", Some(&root)).unwrap();
        let shard = IdentityShard::decode(&encoded).unwrap();
        assert_eq!(shard.issuer, "ExampleRoot");
        assert!(!shard.is_mock());
    }
}
