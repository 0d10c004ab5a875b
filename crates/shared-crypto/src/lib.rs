//! Shared cryptography utilities
//!
//! This crate provides the P-256 identities, hashing helpers and identity
//! shards used to notarize documents.

pub mod error;
pub mod keys;
pub mod shard;

pub use error::CryptoError;
pub use keys::{
    decode_public_key, sha256, sha256_hex, verify_with_public_key, NotaryIdentity,
    SigningIdentity,
};
pub use shard::{IdentityShard, PriorKey, RootAuthority, TrustAnchor, TrustDecision};
