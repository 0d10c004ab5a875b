//! Collaborators the notary talks to
//!
//! Profiles, blob storage, messaging and the signing-request registry sit
//! behind traits. The in-memory implementations back the tests; the
//! filesystem ones back the CLI and keep everything under the data dir.

use crate::error::NotaryError;
use crate::persist::{load_json, save_json};
use serde::{Deserialize, Serialize};
use shared_types::{RequestStatus, SigningRequest};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub uid: String,
    /// Base64 SPKI of the member's current signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: String,
    pub text: String,
    pub links: Vec<String>,
    pub sent_at_ms: i64,
}

pub trait ProfileStore {
    fn get_profile(&self, uid: &str) -> Result<Option<Profile>, NotaryError>;

    /// Publish the member's public key, creating the profile if needed
    fn publish_public_key(&self, uid: &str, public_key: &str) -> Result<(), NotaryError>;
}

pub trait BlobStore {
    /// Store bytes under `path` and return a URL for them
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String, NotaryError>;
}

pub trait Messenger {
    fn notify(&self, notification: &Notification) -> Result<(), NotaryError>;
}

pub trait RequestRegistry {
    fn get_request(&self, id: &str) -> Result<Option<SigningRequest>, NotaryError>;

    fn save_request(&self, request: &SigningRequest) -> Result<(), NotaryError>;

    /// Pending requests addressed to `signer_id`
    fn pending_for(&self, signer_id: &str) -> Result<Vec<SigningRequest>, NotaryError>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, NotaryError> {
    mutex
        .lock()
        .map_err(|_| NotaryError::Storage("collaborator lock poisoned".to_string()))
}

fn pending(requests: impl Iterator<Item = SigningRequest>, signer_id: &str) -> Vec<SigningRequest> {
    requests
        .filter(|r| r.signer_id == signer_id && r.status == RequestStatus::Pending)
        .collect()
}

// ============================================================
// In-memory
// ============================================================

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get_profile(&self, uid: &str) -> Result<Option<Profile>, NotaryError> {
        Ok(lock(&self.profiles)?.get(uid).cloned())
    }

    fn publish_public_key(&self, uid: &str, public_key: &str) -> Result<(), NotaryError> {
        let mut profiles = lock(&self.profiles)?;
        let profile = profiles.entry(uid.to_string()).or_insert_with(|| Profile {
            uid: uid.to_string(),
            ..Profile::default()
        });
        profile.public_key = Some(public_key.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).ok()?.get(path).cloned()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String, NotaryError> {
        lock(&self.blobs)?.insert(path.to_string(), bytes.to_vec());
        Ok(format!("memory://{}", path))
    }
}

#[derive(Debug, Default)]
pub struct MemoryMessenger {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).map(|s| s.clone()).unwrap_or_default()
    }
}

impl Messenger for MemoryMessenger {
    fn notify(&self, notification: &Notification) -> Result<(), NotaryError> {
        lock(&self.sent)?.push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRequestRegistry {
    requests: Mutex<BTreeMap<String, SigningRequest>>,
}

impl MemoryRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestRegistry for MemoryRequestRegistry {
    fn get_request(&self, id: &str) -> Result<Option<SigningRequest>, NotaryError> {
        Ok(lock(&self.requests)?.get(id).cloned())
    }

    fn save_request(&self, request: &SigningRequest) -> Result<(), NotaryError> {
        lock(&self.requests)?.insert(request.id.clone(), request.clone());
        Ok(())
    }

    fn pending_for(&self, signer_id: &str) -> Result<Vec<SigningRequest>, NotaryError> {
        let requests = lock(&self.requests)?;
        Ok(pending(requests.values().cloned(), signer_id))
    }
}

// ============================================================
// Filesystem
// ============================================================

/// Profiles kept in one JSON file keyed by uid
#[derive(Debug, Clone)]
pub struct FsProfileStore {
    path: PathBuf,
}

impl FsProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProfileStore for FsProfileStore {
    fn get_profile(&self, uid: &str) -> Result<Option<Profile>, NotaryError> {
        let mut profiles: BTreeMap<String, Profile> = load_json(&self.path)?;
        Ok(profiles.remove(uid))
    }

    fn publish_public_key(&self, uid: &str, public_key: &str) -> Result<(), NotaryError> {
        let mut profiles: BTreeMap<String, Profile> = load_json(&self.path)?;
        let profile = profiles.entry(uid.to_string()).or_insert_with(|| Profile {
            uid: uid.to_string(),
            ..Profile::default()
        });
        profile.public_key = Some(public_key.to_string());
        save_json(&self.path, &profiles)
    }
}

/// Blobs written below a root directory, addressed by `file://` URLs
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, NotaryError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(NotaryError::Storage(format!("invalid blob path '{}'", path)));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String, NotaryError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes)?;
        let absolute = target.canonicalize().unwrap_or(target);
        Ok(format!("file://{}", absolute.display()))
    }
}

/// Appends notifications to a JSON Lines outbox
#[derive(Debug, Clone)]
pub struct FsMessenger {
    outbox: PathBuf,
}

impl FsMessenger {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }
}

impl Messenger for FsMessenger {
    fn notify(&self, notification: &Notification) -> Result<(), NotaryError> {
        if let Some(parent) = self.outbox.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(notification)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox)?;
        file.write_all(&line)?;
        Ok(())
    }
}

/// Signing requests kept in one JSON file keyed by id
#[derive(Debug, Clone)]
pub struct FsRequestRegistry {
    path: PathBuf,
}

impl FsRequestRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RequestRegistry for FsRequestRegistry {
    fn get_request(&self, id: &str) -> Result<Option<SigningRequest>, NotaryError> {
        let mut requests: BTreeMap<String, SigningRequest> = load_json(&self.path)?;
        Ok(requests.remove(id))
    }

    fn save_request(&self, request: &SigningRequest) -> Result<(), NotaryError> {
        let mut requests: BTreeMap<String, SigningRequest> = load_json(&self.path)?;
        requests.insert(request.id.clone(), request.clone());
        save_json(&self.path, &requests)
    }

    fn pending_for(&self, signer_id: &str) -> Result<Vec<SigningRequest>, NotaryError> {
        let requests: BTreeMap<String, SigningRequest> = load_json(&self.path)?;
        Ok(pending(requests.into_values(), signer_id))
    }
}
