pub mod manifest;
pub mod types;

pub use manifest::{ManifestError, PageHash, PageHashManifest, SignaturePayload};
pub use types::{
    CertificateRecord, FailureKind, OverlayKind, Placement, QualityAudit, RequestStatus,
    SigningRequest, TrustSource, VerificationReport,
};
