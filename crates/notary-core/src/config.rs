//! Notary configuration
//!
//! Read from the environment (after `.env` has been loaded by the binary):
//!
//! | Variable                  | Default                          |
//! |---------------------------|----------------------------------|
//! | `NOTARY_DATA_DIR`         | platform data dir + `/notary`    |
//! | `NOTARY_ROOT_PUBLIC_KEY`  | unset (only mock shards usable)  |
//! | `NOTARY_ROOT_ISSUER`      | `AIVoiceCast`                    |
//! | `NOTARY_ACCEPT_MOCK_ROOT` | `true`                           |

use crate::error::NotaryError;
use shared_crypto::shard::DEFAULT_ISSUER;
use shared_crypto::{decode_public_key, TrustAnchor};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryConfig {
    /// Directory holding the key store and the local collaborator files
    pub data_dir: PathBuf,
    /// Base64 SPKI key that signs identity shards
    pub root_public_key: Option<String>,
    pub root_issuer: String,
    /// Accept legacy shards carrying the mock root sentinel
    pub accept_mock_root: bool,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            root_public_key: None,
            root_issuer: DEFAULT_ISSUER.to_string(),
            accept_mock_root: true,
        }
    }
}

impl NotaryConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, NotaryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotaryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let accept_mock_root = match non_empty("NOTARY_ACCEPT_MOCK_ROOT") {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                NotaryError::Config(format!("NOTARY_ACCEPT_MOCK_ROOT: '{}' is not a boolean", value))
            })?,
            None => defaults.accept_mock_root,
        };

        Ok(Self {
            data_dir: non_empty("NOTARY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            root_public_key: non_empty("NOTARY_ROOT_PUBLIC_KEY"),
            root_issuer: non_empty("NOTARY_ROOT_ISSUER").unwrap_or(defaults.root_issuer),
            accept_mock_root,
        })
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// The anchor used to admit identity shards into the trust registry
    pub fn trust_anchor(&self) -> Result<TrustAnchor, NotaryError> {
        let root_key = match &self.root_public_key {
            Some(encoded) => Some(decode_public_key(encoded).map_err(|e| {
                NotaryError::Config(format!("NOTARY_ROOT_PUBLIC_KEY: {}", e))
            })?),
            None => None,
        };
        Ok(TrustAnchor::new(
            &self.root_issuer,
            root_key,
            self.accept_mock_root,
        ))
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join("keystore.json")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }

    pub fn requests_path(&self) -> PathBuf {
        self.data_dir.join("requests.json")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.data_dir.join("outbox.jsonl")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notary")
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
