//! Shared PDF handling utilities
//!
//! This crate provides PDF parsing, deterministic page hashing, overlay
//! baking and the certificate PDF format used by the notary.

pub mod builder;
pub mod certificate;
pub mod error;
pub mod hashing;
pub mod overlay;
pub mod parser;

pub use builder::DocumentBuilder;
pub use certificate::{parse_certificate, render_certificate};
pub use error::PdfError;
pub use hashing::{compute_deterministic_page_hash, compute_manifest, manifest_from_bytes};
pub use overlay::apply_overlays;
pub use parser::PdfDocument;
