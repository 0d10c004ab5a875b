//! Error types for the notary

use shared_crypto::CryptoError;
use shared_pdf::PdfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotaryError {
    /// No signing key could be provisioned or loaded for the member
    #[error("Handshake Required: {0}")]
    IdentityUnavailable(String),

    #[error("Invalid signer id: {0}")]
    InvalidSignerId(String),

    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("Identity shard rejected: {0}")]
    TrustAnchorRejected(String),

    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("Signing request not found: {0}")]
    RequestNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF error: {0}")]
    Pdf(PdfError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<PdfError> for NotaryError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::InvalidPlacement(msg) => NotaryError::InvalidPlacement(msg),
            other => NotaryError::Pdf(other),
        }
    }
}

/// Signer ids are bound into the `|`-separated payload, so they can't contain
/// one. Certificate fields are read back trimmed, so edges must be clean too.
pub fn validate_signer_id(signer_id: &str) -> Result<(), NotaryError> {
    if signer_id.trim().is_empty() {
        return Err(NotaryError::InvalidSignerId("empty".to_string()));
    }
    if signer_id.trim() != signer_id {
        return Err(NotaryError::InvalidSignerId(format!(
            "'{}' has leading or trailing whitespace",
            signer_id
        )));
    }
    if signer_id.contains('|') {
        return Err(NotaryError::InvalidSignerId(format!(
            "'{}' contains '|'",
            signer_id
        )));
    }
    Ok(())
}
