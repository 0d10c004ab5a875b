//! Notarization of PDF documents
//!
//! Members sign documents with a P-256 key provisioned on first use. Signing
//! bakes visible overlays into the pages, hashes every page and signs the
//! manifest; the result is the signed PDF plus a certificate PDF. Verification
//! recomputes the hashes and checks the signature against a trusted key from
//! the local registry or, failing that, the key the certificate carries.

pub mod collab;
pub mod config;
pub mod error;
pub mod identity;
pub mod keystore;
mod persist;
pub mod registry;
pub mod signing;
pub mod verify;

pub use collab::{
    BlobStore, FsBlobStore, FsMessenger, FsProfileStore, FsRequestRegistry, MemoryBlobStore,
    MemoryMessenger, MemoryProfileStore, MemoryRequestRegistry, Messenger, Notification, Profile,
    ProfileStore, RequestRegistry,
};
pub use config::NotaryConfig;
pub use error::NotaryError;
pub use identity::{ensure_identity, export_identity, rotate_identity, MemberIdentity};
pub use keystore::{
    FileKeyStore, KeyStore, MemoryKeyStore, StoredIdentity, TrustedIdentity, TrustedKey,
};
pub use registry::{NoTrustedIdentities, TrustLookup, TrustRegistry};
pub use signing::{
    decline_request, deliver_local, deliver_remote, sign_document, SignedArtifacts,
};
pub use verify::{verify, QualityAuditor};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
