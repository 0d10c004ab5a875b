use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the public key used for verification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustSource {
    /// Explicitly imported into the local trust registry
    Registry,
    /// Self-asserted by the certificate's own identity shard
    Embedded,
}

impl fmt::Display for TrustSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustSource::Registry => write!(f, "registry"),
            TrustSource::Embedded => write!(f, "embedded"),
        }
    }
}

/// Why a verification did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    CertificateParse,
    ContentIntegrity,
    UntrustedSigner,
    KeyRevoked,
    SignatureInvalid,
    DocumentUnreadable,
}

impl FailureKind {
    /// User-facing message for this failure
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::CertificateParse => "Certificate metadata corrupted or missing.",
            FailureKind::ContentIntegrity => {
                "Sector Parity Check Failed: Content has been modified."
            }
            FailureKind::UntrustedSigner => "Signer not in trusted ledger.",
            FailureKind::KeyRevoked => "Signer key was revoked before this document was signed.",
            FailureKind::SignatureInvalid => "Signature failed cryptographic handshake.",
            FailureKind::DocumentUnreadable => "Target document could not be read as a PDF.",
        }
    }
}

/// Auxiliary content score. Never part of the trust verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAudit {
    /// 0-100
    pub score: u8,
    pub summary: String,
}

/// Outcome of checking a document against its certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub is_valid: bool,
    pub signer_id: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub page_matches: Vec<bool>,
    pub trust_source: Option<TrustSource>,
    pub failure: Option<FailureKind>,
    pub reason: Option<String>,
    pub quality: Option<QualityAudit>,
}

impl VerificationReport {
    pub fn passed(
        signer_id: &str,
        timestamp_ms: i64,
        page_matches: Vec<bool>,
        trust_source: TrustSource,
    ) -> Self {
        Self {
            is_valid: true,
            signer_id: Some(signer_id.to_string()),
            timestamp_ms: Some(timestamp_ms),
            page_matches,
            trust_source: Some(trust_source),
            failure: None,
            reason: None,
            quality: None,
        }
    }

    pub fn failed(kind: FailureKind) -> Self {
        Self {
            is_valid: false,
            signer_id: None,
            timestamp_ms: None,
            page_matches: Vec::new(),
            trust_source: None,
            failure: Some(kind),
            reason: Some(kind.message().to_string()),
            quality: None,
        }
    }

    pub fn with_signer(mut self, signer_id: &str, timestamp_ms: i64) -> Self {
        self.signer_id = Some(signer_id.to_string());
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn with_page_matches(mut self, page_matches: Vec<bool>) -> Self {
        self.page_matches = page_matches;
        self
    }

    pub fn with_trust_source(mut self, trust_source: TrustSource) -> Self {
        self.trust_source = Some(trust_source);
        self
    }

    /// "PASS" or "FAIL"
    pub fn verdict(&self) -> &'static str {
        if self.is_valid {
            "PASS"
        } else {
            "FAIL"
        }
    }
}

/// Structured signing metadata carried by a certificate PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub signer_id: String,
    pub timestamp_ms: i64,
    /// Manifest string exactly as signed
    pub manifest: String,
    /// Base64 ECDSA signature over the canonical payload
    pub signature: String,
    /// Base64 identity shard for the signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_shard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_epoch: Option<u32>,
}

/// What to draw on a page before hashing and signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayKind {
    /// Typed text, drawn in Helvetica
    Text { text: String, font_size: f64 },
    /// PNG signature image, scaled to the placement rect
    Image { png: Vec<u8> },
}

/// An overlay positioned in PDF user space (origin bottom-left)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// 1-based page number
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub kind: OverlayKind,
}

impl Placement {
    pub fn text(page: u32, rect: [f64; 4], text: &str, font_size: f64) -> Self {
        Self {
            page,
            x: rect[0],
            y: rect[1],
            width: rect[2],
            height: rect[3],
            kind: OverlayKind::Text {
                text: text.to_string(),
                font_size,
            },
        }
    }

    pub fn image(page: u32, rect: [f64; 4], png: Vec<u8>) -> Self {
        Self {
            page,
            x: rect[0],
            y: rect[1],
            width: rect[2],
            height: rect[3],
            kind: OverlayKind::Image { png },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Signed,
    Declined,
}

/// A request by one member for another to sign a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub id: String,
    pub requester_id: String,
    pub signer_id: String,
    pub document_name: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
}

impl SigningRequest {
    pub fn new(id: &str, requester_id: &str, signer_id: &str, document_name: &str) -> Self {
        Self {
            id: id.to_string(),
            requester_id: requester_id.to_string(),
            signer_id: signer_id.to_string(),
            document_name: document_name.to_string(),
            status: RequestStatus::Pending,
            signed_url: None,
            certificate_url: None,
        }
    }
}
