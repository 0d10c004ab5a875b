//! Verification of a signed document against its certificate
//!
//! Gates run in a fixed order and the first failure decides the report:
//! 1. certificate parse
//! 2. page-by-page content integrity
//! 3. key resolution (registry first, by the certificate's key epoch, then
//!    the certificate's own shard)
//! 4. signature over the canonical payload
//! 5. revocation or retirement of a registry key at the signing time
//!
//! Content is checked before the signature so a tampered page is reported as
//! such rather than as a generic crypto failure.

use crate::error::NotaryError;
use crate::registry::TrustLookup;
use p256::ecdsa::VerifyingKey;
use shared_crypto::{decode_public_key, verify_with_public_key, IdentityShard};
use shared_pdf::{manifest_from_bytes, parse_certificate};
use shared_types::{
    CertificateRecord, FailureKind, PageHashManifest, QualityAudit, SignaturePayload, TrustSource,
    VerificationReport,
};
use tracing::{debug, info, warn};

/// Scores document content. Advisory only: the score lands in
/// [`VerificationReport::quality`] and never changes the verdict.
pub trait QualityAuditor {
    fn audit(&self, document: &[u8]) -> Result<QualityAudit, NotaryError>;
}

struct ResolvedKey {
    key: VerifyingKey,
    source: TrustSource,
    revoked_from_ms: Option<i64>,
}

fn resolve_key(record: &CertificateRecord, registry: &dyn TrustLookup) -> Option<ResolvedKey> {
    match registry.lookup(&record.signer_id) {
        Ok(Some(entry)) => {
            let trusted = entry.key_for_epoch(record.key_epoch);
            debug!(
                signer = %record.signer_id,
                certificate_epoch = record.key_epoch,
                key_epoch = trusted.epoch,
                "Resolved registry key"
            );
            match decode_public_key(trusted.public_key) {
                Ok(key) => {
                    return Some(ResolvedKey {
                        key,
                        source: TrustSource::Registry,
                        revoked_from_ms: trusted.revoked_from_ms,
                    })
                }
                Err(e) => warn!(signer = %record.signer_id, "Registry key is unusable: {}", e),
            }
        }
        Ok(None) => {}
        Err(e) => warn!(signer = %record.signer_id, "Trust registry lookup failed: {}", e),
    }

    let shard = record.cert_shard.as_deref()?;
    match IdentityShard::decode(shard).and_then(|s| s.verifying_key()) {
        Ok(key) => Some(ResolvedKey {
            key,
            source: TrustSource::Embedded,
            revoked_from_ms: None,
        }),
        Err(e) => {
            warn!(signer = %record.signer_id, "Embedded certificate shard is unusable: {}", e);
            None
        }
    }
}

fn check(
    target_pdf: &[u8],
    certificate_pdf: &[u8],
    registry: &dyn TrustLookup,
) -> VerificationReport {
    let record = match parse_certificate(certificate_pdf) {
        Ok(record) => record,
        Err(e) => {
            debug!("Certificate parse failed: {}", e);
            return VerificationReport::failed(FailureKind::CertificateParse);
        }
    };
    let signer = record.signer_id.as_str();
    let ts = record.timestamp_ms;

    let recorded: PageHashManifest = match record.manifest.parse() {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!("Recorded manifest is malformed: {}", e);
            return VerificationReport::failed(FailureKind::CertificateParse)
                .with_signer(signer, ts);
        }
    };

    let actual = match manifest_from_bytes(target_pdf) {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!("Target document is unreadable: {}", e);
            return VerificationReport::failed(FailureKind::DocumentUnreadable)
                .with_signer(signer, ts);
        }
    };

    let page_matches = actual.page_matches(&recorded);
    if page_matches.iter().any(|m| !m) {
        return VerificationReport::failed(FailureKind::ContentIntegrity)
            .with_signer(signer, ts)
            .with_page_matches(page_matches);
    }

    let Some(resolved) = resolve_key(&record, registry) else {
        return VerificationReport::failed(FailureKind::UntrustedSigner)
            .with_signer(signer, ts)
            .with_page_matches(page_matches);
    };

    let payload = SignaturePayload::from_recorded(&record.manifest, ts, signer);
    let signature_ok =
        verify_with_public_key(&resolved.key, &payload.as_bytes(), &record.signature)
            .unwrap_or(false);
    if !signature_ok {
        return VerificationReport::failed(FailureKind::SignatureInvalid)
            .with_signer(signer, ts)
            .with_page_matches(page_matches)
            .with_trust_source(resolved.source);
    }

    if resolved.revoked_from_ms.is_some_and(|revoked| revoked <= ts) {
        return VerificationReport::failed(FailureKind::KeyRevoked)
            .with_signer(signer, ts)
            .with_page_matches(page_matches)
            .with_trust_source(resolved.source);
    }

    VerificationReport::passed(signer, ts, page_matches, resolved.source)
}

/// Verify `target_pdf` against `certificate_pdf`.
///
/// Never fails: every problem becomes a report with `is_valid: false` and a
/// reason.
pub fn verify(
    target_pdf: &[u8],
    certificate_pdf: &[u8],
    registry: &dyn TrustLookup,
    auditor: Option<&dyn QualityAuditor>,
) -> VerificationReport {
    let mut report = check(target_pdf, certificate_pdf, registry);

    if let Some(auditor) = auditor {
        match auditor.audit(target_pdf) {
            Ok(audit) => report.quality = Some(audit),
            Err(e) => warn!("Quality audit failed: {}", e),
        }
    }

    info!(
        verdict = report.verdict(),
        signer = report.signer_id.as_deref().unwrap_or("-"),
        trust_source = ?report.trust_source,
        failure = ?report.failure,
        "Verified document"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryProfileStore;
    use crate::identity::ensure_identity;
    use crate::keystore::MemoryKeyStore;
    use crate::registry::NoTrustedIdentities;
    use crate::signing::sign_document;
    use pretty_assertions::assert_eq;
    use shared_pdf::builder::{text_line, DocumentBuilder, HELVETICA};
    use shared_pdf::render_certificate;

    struct FixedAuditor(u8);

    impl QualityAuditor for FixedAuditor {
        fn audit(&self, _document: &[u8]) -> Result<QualityAudit, NotaryError> {
            Ok(QualityAudit {
                score: self.0,
                summary: "fixed".to_string(),
            })
        }
    }

    struct FailingAuditor;

    impl QualityAuditor for FailingAuditor {
        fn audit(&self, _document: &[u8]) -> Result<QualityAudit, NotaryError> {
            Err(NotaryError::Storage("auditor offline".to_string()))
        }
    }

    fn document(pages: &[&str]) -> Vec<u8> {
        let mut builder = DocumentBuilder::new();
        for text in pages {
            builder
                .add_page(612.0, 792.0, text_line(HELVETICA, 12.0, 72.0, 700.0, text))
                .unwrap();
        }
        builder.finish().unwrap()
    }

    fn signed(pages: &[&str]) -> (Vec<u8>, Vec<u8>, CertificateRecord) {
        let identity =
            ensure_identity(&MemoryKeyStore::new(), &MemoryProfileStore::new(), "U1", 1).unwrap();
        let artifacts = sign_document(&document(pages), &[], &identity, "U1", 1_000).unwrap();
        (artifacts.signed_pdf, artifacts.certificate_pdf, artifacts.record)
    }

    #[test]
    fn test_untouched_document_passes_with_embedded_key() {
        let (pdf, cert, _) = signed(&["one", "two"]);
        let report = verify(&pdf, &cert, &NoTrustedIdentities, None);

        assert!(report.is_valid);
        assert_eq!(report.page_matches, vec![true, true]);
        assert_eq!(report.trust_source, Some(TrustSource::Embedded));
        assert_eq!(report.signer_id.as_deref(), Some("U1"));
        assert_eq!(report.timestamp_ms, Some(1_000));
    }

    #[test]
    fn test_extra_page_is_integrity_failure() {
        let (_, cert, _) = signed(&["one", "two"]);
        let report = verify(&document(&["one", "two", "three"]), &cert, &NoTrustedIdentities, None);

        assert_eq!(report.failure, Some(FailureKind::ContentIntegrity));
        assert_eq!(report.page_matches.len(), 3);
        assert!(!report.page_matches[2]);
    }

    #[test]
    fn test_garbage_certificate() {
        let (pdf, _, _) = signed(&["one"]);
        let report = verify(&pdf, b"not a pdf", &NoTrustedIdentities, None);
        assert_eq!(report.failure, Some(FailureKind::CertificateParse));
        assert_eq!(
            report.reason.as_deref(),
            Some("Certificate metadata corrupted or missing.")
        );
    }

    #[test]
    fn test_malformed_manifest_is_parse_failure() {
        let (pdf, _, mut record) = signed(&["one"]);
        record.manifest = "P2:abc".to_string();
        let cert = render_certificate(&record).unwrap();
        let report = verify(&pdf, &cert, &NoTrustedIdentities, None);
        assert_eq!(report.failure, Some(FailureKind::CertificateParse));
    }

    #[test]
    fn test_unreadable_target() {
        let (_, cert, _) = signed(&["one"]);
        let report = verify(b"%PDF-garbage", &cert, &NoTrustedIdentities, None);
        assert_eq!(report.failure, Some(FailureKind::DocumentUnreadable));
    }

    #[test]
    fn test_no_key_anywhere_is_untrusted() {
        let (pdf, _, mut record) = signed(&["one"]);
        record.cert_shard = None;
        let cert = render_certificate(&record).unwrap();

        let report = verify(&pdf, &cert, &NoTrustedIdentities, None);
        assert_eq!(report.failure, Some(FailureKind::UntrustedSigner));
        assert_eq!(report.reason.as_deref(), Some("Signer not in trusted ledger."));
    }

    #[test]
    fn test_tampered_timestamp_breaks_signature() {
        let (pdf, _, mut record) = signed(&["one"]);
        record.timestamp_ms += 1;
        let cert = render_certificate(&record).unwrap();

        let report = verify(&pdf, &cert, &NoTrustedIdentities, None);
        assert_eq!(report.failure, Some(FailureKind::SignatureInvalid));
        assert_eq!(report.page_matches, vec![true]);
    }

    #[test]
    fn test_quality_score_never_changes_verdict() {
        let (pdf, cert, _) = signed(&["one"]);
        let low = verify(&pdf, &cert, &NoTrustedIdentities, Some(&FixedAuditor(3)));
        assert!(low.is_valid);
        assert_eq!(low.quality.as_ref().map(|q| q.score), Some(3));

        let failing = verify(&pdf, &cert, &NoTrustedIdentities, Some(&FailingAuditor));
        assert!(failing.is_valid);
        assert_eq!(failing.quality, None);

        let tampered = verify(&document(&["two"]), &cert, &NoTrustedIdentities, Some(&FixedAuditor(100)));
        assert!(!tampered.is_valid);
        assert_eq!(tampered.quality.as_ref().map(|q| q.score), Some(100));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::collab::MemoryProfileStore;
    use crate::identity::ensure_identity;
    use crate::keystore::MemoryKeyStore;
    use crate::registry::NoTrustedIdentities;
    use crate::signing::sign_document;
    use proptest::prelude::*;
    use shared_pdf::builder::{text_line, DocumentBuilder, HELVETICA};

    fn document(pages: &[String]) -> Vec<u8> {
        let mut builder = DocumentBuilder::new();
        for text in pages {
            builder
                .add_page(612.0, 792.0, text_line(HELVETICA, 12.0, 72.0, 700.0, text))
                .unwrap();
        }
        builder.finish().unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Property: a signed document verifies against its own certificate
        #[test]
        fn signed_document_verifies(
            pages in prop::collection::vec("[a-zA-Z0-9 ]{1,30}", 1..4),
            ts in 0i64..4_000_000_000_000,
        ) {
            let identity = ensure_identity(
                &MemoryKeyStore::new(),
                &MemoryProfileStore::new(),
                "U1",
                1,
            )
            .unwrap();
            let artifacts = sign_document(&document(&pages), &[], &identity, "U1", ts).unwrap();

            let report = verify(&artifacts.signed_pdf, &artifacts.certificate_pdf, &NoTrustedIdentities, None);
            prop_assert!(report.is_valid);
            prop_assert_eq!(report.page_matches, vec![true; pages.len()]);
            prop_assert_eq!(report.timestamp_ms, Some(ts));
        }

        /// Property: rewriting one page flags exactly that page
        #[test]
        fn rewritten_page_is_the_only_mismatch(
            pages in prop::collection::vec("[a-z]{1,20}", 1..4),
            index in any::<prop::sample::Index>(),
        ) {
            let identity = ensure_identity(
                &MemoryKeyStore::new(),
                &MemoryProfileStore::new(),
                "U1",
                1,
            )
            .unwrap();
            let artifacts = sign_document(&document(&pages), &[], &identity, "U1", 42).unwrap();

            let target = index.index(pages.len());
            let mut edited = pages.clone();
            edited[target] = edited[target].to_uppercase();
            let report = verify(&document(&edited), &artifacts.certificate_pdf, &NoTrustedIdentities, None);

            let expected: Vec<bool> = (0..pages.len()).map(|i| i != target).collect();
            prop_assert!(!report.is_valid);
            prop_assert_eq!(report.failure, Some(FailureKind::ContentIntegrity));
            prop_assert_eq!(report.page_matches, expected);
        }
    }
}
