//! Local key store
//!
//! Holds the member's own signing keys (one current key plus retired epochs)
//! and the trusted identities imported from peers. Private keys never leave
//! this store except through [`StoredIdentity::signing_identity`].

use crate::error::NotaryError;
use crate::persist::{load_json, save_json};
use serde::{Deserialize, Serialize};
use shared_crypto::{NotaryIdentity, PriorKey};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A key that was replaced by a rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetiredKey {
    pub epoch: u32,
    pub public_key: String,
    pub created_at_ms: i64,
    pub retired_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredIdentity {
    pub uid: String,
    /// Hex-encoded P-256 scalar
    pub private_key_hex: String,
    /// Base64 SPKI
    pub public_key: String,
    pub epoch: u32,
    pub created_at_ms: i64,
    #[serde(default)]
    pub retired: Vec<RetiredKey>,
}

impl StoredIdentity {
    pub fn signing_identity(&self) -> Result<NotaryIdentity, NotaryError> {
        NotaryIdentity::from_private_key_hex(&self.private_key_hex).map_err(|e| {
            NotaryError::IdentityUnavailable(format!("stored key for {} is unusable: {}", self.uid, e))
        })
    }
}

/// A peer key admitted through the trust anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedIdentity {
    pub uid: String,
    /// The shard exactly as it was pasted
    pub shard: String,
    pub public_key: String,
    pub issuer: String,
    pub imported_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at_ms: Option<i64>,
    /// Epoch of `public_key`, for shards that name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u32>,
    /// Keys of earlier epochs, ordered by epoch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<PriorKey>,
}

/// The key a trusted identity used at one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedKey<'a> {
    pub epoch: Option<u32>,
    pub public_key: &'a str,
    /// Signatures made at or after this time are not accepted
    pub revoked_from_ms: Option<i64>,
}

impl TrustedKey<'_> {
    /// Whether documents signed at `timestamp_ms` fall after the revocation
    pub fn is_revoked_at(&self, timestamp_ms: i64) -> bool {
        self.revoked_from_ms
            .is_some_and(|revoked| revoked <= timestamp_ms)
    }
}

impl TrustedIdentity {
    /// Pick the key for a certificate's epoch.
    ///
    /// A retired epoch gets its old key, revoked from the time it was retired.
    /// Anything else, including epochs this registry never heard of, gets the
    /// current key.
    pub fn key_for_epoch(&self, epoch: Option<u32>) -> TrustedKey<'_> {
        let prior = epoch
            .filter(|e| Some(*e) != self.epoch)
            .and_then(|e| self.retired.iter().find(|k| k.epoch == e));

        match prior {
            Some(prior) => TrustedKey {
                epoch: Some(prior.epoch),
                public_key: &prior.public_key,
                revoked_from_ms: Some(
                    self.revoked_at_ms
                        .map_or(prior.retired_at, |r| r.min(prior.retired_at)),
                ),
            },
            None => TrustedKey {
                epoch: self.epoch,
                public_key: &self.public_key,
                revoked_from_ms: self.revoked_at_ms,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStoreData {
    #[serde(default)]
    pub identities: BTreeMap<String, StoredIdentity>,
    #[serde(default)]
    pub trusted: BTreeMap<String, TrustedIdentity>,
}

pub trait KeyStore {
    fn load_identity(&self, uid: &str) -> Result<Option<StoredIdentity>, NotaryError>;

    fn save_identity(&self, identity: &StoredIdentity) -> Result<(), NotaryError>;

    fn load_trusted(&self, uid: &str) -> Result<Option<TrustedIdentity>, NotaryError>;

    fn save_trusted(&self, entry: &TrustedIdentity) -> Result<(), NotaryError>;

    fn list_trusted(&self) -> Result<Vec<TrustedIdentity>, NotaryError>;
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    data: Mutex<KeyStoreData>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_data<T>(
        &self,
        f: impl FnOnce(&mut KeyStoreData) -> T,
    ) -> Result<T, NotaryError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| NotaryError::Storage("key store lock poisoned".to_string()))?;
        Ok(f(&mut data))
    }
}

impl KeyStore for MemoryKeyStore {
    fn load_identity(&self, uid: &str) -> Result<Option<StoredIdentity>, NotaryError> {
        self.with_data(|data| data.identities.get(uid).cloned())
    }

    fn save_identity(&self, identity: &StoredIdentity) -> Result<(), NotaryError> {
        self.with_data(|data| {
            data.identities
                .insert(identity.uid.clone(), identity.clone());
        })
    }

    fn load_trusted(&self, uid: &str) -> Result<Option<TrustedIdentity>, NotaryError> {
        self.with_data(|data| data.trusted.get(uid).cloned())
    }

    fn save_trusted(&self, entry: &TrustedIdentity) -> Result<(), NotaryError> {
        self.with_data(|data| {
            data.trusted.insert(entry.uid.clone(), entry.clone());
        })
    }

    fn list_trusted(&self) -> Result<Vec<TrustedIdentity>, NotaryError> {
        self.with_data(|data| data.trusted.values().cloned().collect())
    }
}

/// Key store persisted as one JSON file, readable only by its owner
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<KeyStoreData, NotaryError> {
        load_json(&self.path)
    }

    fn update(&self, f: impl FnOnce(&mut KeyStoreData)) -> Result<(), NotaryError> {
        let mut data = self.load()?;
        f(&mut data);
        save_json(&self.path, &data)
    }
}

impl KeyStore for FileKeyStore {
    fn load_identity(&self, uid: &str) -> Result<Option<StoredIdentity>, NotaryError> {
        Ok(self.load()?.identities.remove(uid))
    }

    fn save_identity(&self, identity: &StoredIdentity) -> Result<(), NotaryError> {
        self.update(|data| {
            data.identities
                .insert(identity.uid.clone(), identity.clone());
        })
    }

    fn load_trusted(&self, uid: &str) -> Result<Option<TrustedIdentity>, NotaryError> {
        Ok(self.load()?.trusted.remove(uid))
    }

    fn save_trusted(&self, entry: &TrustedIdentity) -> Result<(), NotaryError> {
        self.update(|data| {
            data.trusted.insert(entry.uid.clone(), entry.clone());
        })
    }

    fn list_trusted(&self) -> Result<Vec<TrustedIdentity>, NotaryError> {
        Ok(self.load()?.trusted.into_values().collect())
    }
}
