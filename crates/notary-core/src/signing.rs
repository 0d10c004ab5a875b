//! Document signing and artifact delivery

use crate::collab::{BlobStore, Messenger, Notification, RequestRegistry};
use crate::error::{validate_signer_id, NotaryError};
use crate::identity::MemberIdentity;
use shared_crypto::shard::DEFAULT_ISSUER;
use shared_crypto::SigningIdentity;
use shared_pdf::{apply_overlays, manifest_from_bytes, render_certificate};
use shared_types::{
    CertificateRecord, PageHashManifest, Placement, RequestStatus, SignaturePayload, SigningRequest,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything produced by one signing
#[derive(Debug, Clone)]
pub struct SignedArtifacts {
    pub signed_pdf: Vec<u8>,
    pub certificate_pdf: Vec<u8>,
    pub record: CertificateRecord,
    pub manifest: PageHashManifest,
}

/// Bake the placements into the document, hash the result and sign it.
///
/// The manifest is computed over the saved output, so the certificate
/// describes exactly the bytes that are handed back.
pub fn sign_document(
    pdf_bytes: &[u8],
    placements: &[Placement],
    identity: &MemberIdentity,
    signer_id: &str,
    timestamp_ms: i64,
) -> Result<SignedArtifacts, NotaryError> {
    validate_signer_id(signer_id)?;

    let signed_pdf = apply_overlays(pdf_bytes, placements)?;
    let manifest = manifest_from_bytes(&signed_pdf)?;
    let payload = SignaturePayload::new(&manifest, timestamp_ms, signer_id);
    let signature = identity.signing_key().sign_base64(&payload.as_bytes());

    let cert_shard = identity.self_issued_shard(DEFAULT_ISSUER).encode()?;
    let record = CertificateRecord {
        signer_id: signer_id.to_string(),
        timestamp_ms,
        manifest: manifest.to_string(),
        signature,
        cert_shard: Some(cert_shard),
        key_epoch: Some(identity.epoch()),
    };
    let certificate_pdf = render_certificate(&record)?;

    info!(
        signer = signer_id,
        pages = manifest.len(),
        overlays = placements.len(),
        epoch = identity.epoch(),
        "Signed document"
    );

    Ok(SignedArtifacts {
        signed_pdf,
        certificate_pdf,
        record,
        manifest,
    })
}

/// `lease.pdf` -> `lease`
fn file_stem(document_name: &str) -> String {
    let stem = Path::new(document_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}

/// File names of the signed document and its certificate
pub fn artifact_names(document_name: &str) -> (String, String) {
    let stem = file_stem(document_name);
    (
        format!("{}-signed.pdf", stem),
        format!("{}-certificate.pdf", stem),
    )
}

/// Load a request that `signer_id` may still act on
fn pending_request(
    requests: &dyn RequestRegistry,
    request_id: &str,
    signer_id: &str,
) -> Result<SigningRequest, NotaryError> {
    let request = requests
        .get_request(request_id)?
        .ok_or_else(|| NotaryError::RequestNotFound(request_id.to_string()))?;

    if request.status != RequestStatus::Pending {
        return Err(NotaryError::InvalidRequest(format!(
            "request {} is already {:?}",
            request_id, request.status
        )));
    }
    if request.signer_id != signer_id {
        return Err(NotaryError::InvalidSignerId(format!(
            "request {} is addressed to {}, not {}",
            request_id, request.signer_id, signer_id
        )));
    }
    Ok(request)
}

/// Upload both artifacts for a pending request, mark it signed and tell the
/// requester where to find them.
pub fn deliver_remote(
    artifacts: &SignedArtifacts,
    request_id: &str,
    blobs: &dyn BlobStore,
    requests: &dyn RequestRegistry,
    messenger: &dyn Messenger,
    now_ms: i64,
) -> Result<SigningRequest, NotaryError> {
    let mut request = pending_request(requests, request_id, &artifacts.record.signer_id)?;

    let (signed_name, cert_name) = artifact_names(&request.document_name);
    let signed_url = blobs.put(
        &format!("signed/{}/{}", request.id, signed_name),
        &artifacts.signed_pdf,
        "application/pdf",
    )?;
    let certificate_url = blobs.put(
        &format!("certificates/{}/{}", request.id, cert_name),
        &artifacts.certificate_pdf,
        "application/pdf",
    )?;

    request.status = RequestStatus::Signed;
    request.signed_url = Some(signed_url.clone());
    request.certificate_url = Some(certificate_url.clone());
    requests.save_request(&request)?;

    messenger.notify(&Notification {
        recipient: request.requester_id.clone(),
        text: format!(
            "{} signed \"{}\". The signed document and its certificate are attached.",
            request.signer_id, request.document_name
        ),
        links: vec![signed_url, certificate_url],
        sent_at_ms: now_ms,
    })?;

    info!(request = %request.id, requester = %request.requester_id, "Delivered signed artifacts");
    Ok(request)
}

/// Refuse a pending request and let the requester know
pub fn decline_request(
    request_id: &str,
    signer_id: &str,
    reason: Option<&str>,
    requests: &dyn RequestRegistry,
    messenger: &dyn Messenger,
    now_ms: i64,
) -> Result<SigningRequest, NotaryError> {
    let mut request = pending_request(requests, request_id, signer_id)?;
    request.status = RequestStatus::Declined;
    requests.save_request(&request)?;

    let mut text = format!(
        "{} declined to sign \"{}\".",
        request.signer_id, request.document_name
    );
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        text.push_str(&format!(" Reason: {}", reason));
    }
    messenger.notify(&Notification {
        recipient: request.requester_id.clone(),
        text,
        links: Vec::new(),
        sent_at_ms: now_ms,
    })?;

    info!(request = %request.id, requester = %request.requester_id, "Declined signing request");
    Ok(request)
}

/// Write both artifacts next to each other in `out_dir`
pub fn deliver_local(
    artifacts: &SignedArtifacts,
    out_dir: &Path,
    document_name: &str,
) -> Result<(PathBuf, PathBuf), NotaryError> {
    fs::create_dir_all(out_dir)?;
    let (signed_name, cert_name) = artifact_names(document_name);
    let signed_path = out_dir.join(signed_name);
    let cert_path = out_dir.join(cert_name);
    fs::write(&signed_path, &artifacts.signed_pdf)?;
    fs::write(&cert_path, &artifacts.certificate_pdf)?;
    info!(signed = %signed_path.display(), certificate = %cert_path.display(), "Wrote signed artifacts");
    Ok((signed_path, cert_path))
}
