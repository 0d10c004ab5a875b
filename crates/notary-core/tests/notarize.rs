//! End-to-end signing and verification

use lopdf::content::{Content, Operation};
use lopdf::Object;
use notary_core::{
    ensure_identity, export_identity, rotate_identity, sign_document, verify, KeyStore,
    MemoryKeyStore, MemoryProfileStore, NoTrustedIdentities, NotaryError, TrustRegistry,
};
use pretty_assertions::assert_eq;
use shared_crypto::{NotaryIdentity, RootAuthority, SigningIdentity, TrustAnchor};
use shared_pdf::builder::{text_line, DocumentBuilder, HELVETICA};
use shared_pdf::{render_certificate, PdfDocument};
use shared_types::{FailureKind, Placement, SignaturePayload, TrustSource};

const SIGNED_AT: i64 = 1_700_000_000_000;

fn two_page_contract() -> Vec<u8> {
    let mut builder = DocumentBuilder::new();
    builder
        .add_page(612.0, 792.0, text_line(HELVETICA, 12.0, 72.0, 700.0, "Terms: rent is 1000"))
        .unwrap();
    builder
        .add_page(612.0, 792.0, text_line(HELVETICA, 12.0, 72.0, 700.0, "Total: 1000"))
        .unwrap();
    builder.finish().unwrap()
}

fn signature_png() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 4, 2);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[20u8; 4 * 2 * 4]).unwrap();
    }
    out
}

/// Rewrite the shown text on one page, keeping everything else
fn tamper_page(pdf: &[u8], page_num: u32, from: &str, to: &str) -> Vec<u8> {
    let mut doc = PdfDocument::from_bytes(pdf).unwrap();
    let page_id = doc.page_id(page_num).unwrap();
    let content = doc.page_content(page_num).unwrap();

    let mut decoded = Content::decode(&content).unwrap();
    for op in decoded.operations.iter_mut() {
        if op.operator == "Tj" {
            if let Some(Object::String(bytes, _)) = op.operands.first_mut() {
                if bytes.as_slice() == from.as_bytes() {
                    *bytes = to.as_bytes().to_vec();
                }
            }
        }
    }
    let encoded = decoded.encode().unwrap();
    doc.doc_mut().change_page_content(page_id, encoded).unwrap();
    doc.save_to_bytes().unwrap()
}

struct Member {
    store: MemoryKeyStore,
    profiles: MemoryProfileStore,
}

impl Member {
    fn new() -> Self {
        Self {
            store: MemoryKeyStore::new(),
            profiles: MemoryProfileStore::new(),
        }
    }

    fn sign(&self, uid: &str, pdf: &[u8], placements: &[Placement]) -> (Vec<u8>, Vec<u8>) {
        let identity = ensure_identity(&self.store, &self.profiles, uid, 1_000).unwrap();
        let artifacts = sign_document(pdf, placements, &identity, uid, SIGNED_AT).unwrap();
        (artifacts.signed_pdf, artifacts.certificate_pdf)
    }
}

fn mock_registry(store: &dyn KeyStore) -> TrustRegistry<'_> {
    TrustRegistry::new(store, TrustAnchor::new("AIVoiceCast", None, true))
}

#[test]
fn untouched_two_page_document_passes() {
    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);

    let report = verify(&signed, &cert, &NoTrustedIdentities, None);
    assert!(report.is_valid);
    assert_eq!(report.verdict(), "PASS");
    assert_eq!(report.page_matches, vec![true, true]);
    assert_eq!(report.signer_id.as_deref(), Some("U1"));
}

#[test]
fn edited_second_page_fails_integrity_gate() {
    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);
    let tampered = tamper_page(&signed, 2, "Total: 1000", "Total: 9000");

    let report = verify(&tampered, &cert, &NoTrustedIdentities, None);
    assert!(!report.is_valid);
    assert_eq!(report.page_matches, vec![true, false]);
    assert_eq!(report.failure, Some(FailureKind::ContentIntegrity));
    assert_eq!(
        report.reason.as_deref(),
        Some("Sector Parity Check Failed: Content has been modified.")
    );
}

#[test]
fn resaved_document_still_passes() {
    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);

    let mut doc = PdfDocument::from_bytes(&signed).unwrap();
    doc.doc_mut().compress();
    doc.doc_mut().renumber_objects();
    let resaved = doc.save_to_bytes().unwrap();
    assert_ne!(resaved, signed);

    assert!(verify(&resaved, &cert, &NoTrustedIdentities, None).is_valid);
}

#[test]
fn overlays_are_covered_by_the_signature() {
    let signer = Member::new();
    let placements = vec![
        Placement::text(2, [72.0, 120.0, 220.0, 20.0], "Signed by U1", 11.0),
        Placement::image(2, [320.0, 110.0, 120.0, 60.0], signature_png()),
    ];
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &placements);

    let report = verify(&signed, &cert, &NoTrustedIdentities, None);
    assert!(report.is_valid);

    // The unsigned original no longer matches page 2
    let report = verify(&two_page_contract(), &cert, &NoTrustedIdentities, None);
    assert_eq!(report.page_matches, vec![true, false]);
}

#[test]
fn imported_peer_is_trusted_through_registry() {
    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);
    let shard = export_identity(&signer.store, "U1", "AIVoiceCast", None).unwrap();

    let verifier_store = MemoryKeyStore::new();
    let registry = mock_registry(&verifier_store);

    let before = verify(&signed, &cert, &registry, None);
    assert!(before.is_valid);
    assert_eq!(before.trust_source, Some(TrustSource::Embedded));

    registry.import_identity("U1", &shard, 2_000).unwrap();
    let after = verify(&signed, &cert, &registry, None);
    assert!(after.is_valid);
    assert_eq!(after.trust_source, Some(TrustSource::Registry));
}

#[test]
fn impostor_with_own_shard_is_caught_by_registry() {
    let genuine = Member::new();
    ensure_identity(&genuine.store, &genuine.profiles, "U1", 1).unwrap();
    let shard = export_identity(&genuine.store, "U1", "AIVoiceCast", None).unwrap();

    // A different key claiming to be U1
    let impostor = Member::new();
    let (signed, cert) = impostor.sign("U1", &two_page_contract(), &[]);

    let verifier_store = MemoryKeyStore::new();
    let registry = mock_registry(&verifier_store);

    // Self-asserted keys can't tell the difference
    let embedded = verify(&signed, &cert, &registry, None);
    assert_eq!(embedded.trust_source, Some(TrustSource::Embedded));
    assert!(embedded.is_valid);

    registry.import_identity("U1", &shard, 2_000).unwrap();
    let report = verify(&signed, &cert, &registry, None);
    assert!(!report.is_valid);
    assert_eq!(report.failure, Some(FailureKind::SignatureInvalid));
    assert_eq!(report.trust_source, Some(TrustSource::Registry));
}

#[test]
fn forged_signature_is_rejected() {
    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);
    let mut record = shared_pdf::parse_certificate(&cert).unwrap();

    let forger = NotaryIdentity::generate();
    let payload = SignaturePayload::from_recorded(&record.manifest, record.timestamp_ms, "U1");
    record.signature = forger.sign_base64(&payload.as_bytes());
    let forged_cert = render_certificate(&record).unwrap();

    let report = verify(&signed, &forged_cert, &NoTrustedIdentities, None);
    assert_eq!(report.failure, Some(FailureKind::SignatureInvalid));
    assert_eq!(
        report.reason.as_deref(),
        Some("Signature failed cryptographic handshake.")
    );
}

#[test]
fn certificate_without_signature_is_parse_failure() {
    let signer = Member::new();
    let (signed, _) = signer.sign("U1", &two_page_contract(), &[]);

    let mut builder = DocumentBuilder::new();
    let mut ops: Vec<Operation> = Vec::new();
    ops.extend(text_line(HELVETICA, 10.0, 40.0, 800.0, "AUTH ID: U1"));
    ops.extend(text_line(HELVETICA, 10.0, 40.0, 780.0, "NONCE TS: 1700000000000"));
    builder.add_page(595.0, 842.0, ops).unwrap();
    let cert = builder.finish().unwrap();

    let report = verify(&signed, &cert, &NoTrustedIdentities, None);
    assert_eq!(report.failure, Some(FailureKind::CertificateParse));
}

#[test]
fn revoked_registry_key_fails_for_later_documents() {
    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);
    let shard = export_identity(&signer.store, "U1", "AIVoiceCast", None).unwrap();

    let verifier_store = MemoryKeyStore::new();
    let registry = mock_registry(&verifier_store);
    registry.import_identity("U1", &shard, 2_000).unwrap();

    registry.revoke_identity("U1", SIGNED_AT + 1).unwrap();
    assert!(verify(&signed, &cert, &registry, None).is_valid);

    registry.revoke_identity("U1", SIGNED_AT).unwrap();
    let report = verify(&signed, &cert, &registry, None);
    assert_eq!(report.failure, Some(FailureKind::KeyRevoked));
}

#[test]
fn rotation_keeps_earlier_signatures_valid() {
    let signer = Member::new();
    let (old_signed, old_cert) = signer.sign("U1", &two_page_contract(), &[]);
    let old_key = signer.store.load_identity("U1").unwrap().unwrap();

    let rotated_at = SIGNED_AT + 60_000;
    rotate_identity(&signer.store, &signer.profiles, "U1", rotated_at).unwrap();
    let shard = export_identity(&signer.store, "U1", "AIVoiceCast", None).unwrap();

    // A verifier who only ever saw the rotated shard
    let verifier_store = MemoryKeyStore::new();
    let registry = mock_registry(&verifier_store);
    registry.import_identity("U1", &shard, rotated_at + 1).unwrap();

    let report = verify(&old_signed, &old_cert, &registry, None);
    assert!(report.is_valid);
    assert_eq!(report.trust_source, Some(TrustSource::Registry));

    let identity = ensure_identity(&signer.store, &signer.profiles, "U1", 1).unwrap();
    assert_eq!(identity.epoch(), 2);
    let fresh = sign_document(&two_page_contract(), &[], &identity, "U1", rotated_at + 5).unwrap();
    let report = verify(&fresh.signed_pdf, &fresh.certificate_pdf, &registry, None);
    assert!(report.is_valid);
    assert_eq!(report.trust_source, Some(TrustSource::Registry));

    // The retired key can't sign anything dated after the rotation
    let leaked = MemoryKeyStore::new();
    leaked.save_identity(&old_key).unwrap();
    let old_identity = ensure_identity(&leaked, &MemoryProfileStore::new(), "U1", 1).unwrap();
    let late = sign_document(&two_page_contract(), &[], &old_identity, "U1", rotated_at).unwrap();
    let report = verify(&late.signed_pdf, &late.certificate_pdf, &registry, None);
    assert_eq!(report.failure, Some(FailureKind::KeyRevoked));
}

#[test]
fn verifier_that_trusted_the_old_key_follows_the_rotation() {
    let signer = Member::new();
    let (old_signed, old_cert) = signer.sign("U1", &two_page_contract(), &[]);

    let verifier_store = MemoryKeyStore::new();
    let registry = mock_registry(&verifier_store);
    let first = export_identity(&signer.store, "U1", "AIVoiceCast", None).unwrap();
    registry.import_identity("U1", &first, 2_000).unwrap();

    rotate_identity(&signer.store, &signer.profiles, "U1", SIGNED_AT + 1).unwrap();
    let second = export_identity(&signer.store, "U1", "AIVoiceCast", None).unwrap();
    let entry = registry.import_identity("U1", &second, SIGNED_AT + 2).unwrap();
    assert_eq!(entry.epoch, Some(2));
    assert_eq!(entry.retired.len(), 1);

    assert!(verify(&old_signed, &old_cert, &registry, None).is_valid);

    // Replaying the first shard doesn't roll the registry back
    assert!(matches!(
        registry.import_identity("U1", &first, SIGNED_AT + 3),
        Err(NotaryError::TrustAnchorRejected(_))
    ));
}

#[test]
fn root_signed_shards_replace_the_mock() {
    let root = RootAuthority::new(NotaryIdentity::generate(), "ExampleRoot");
    let root_key = shared_crypto::decode_public_key(&root.public_key_base64().unwrap()).unwrap();

    let signer = Member::new();
    let (signed, cert) = signer.sign("U1", &two_page_contract(), &[]);

    let verifier_store = MemoryKeyStore::new();
    let registry = TrustRegistry::new(
        &verifier_store,
        TrustAnchor::new("ExampleRoot", Some(root_key), false),
    );

    let mock = export_identity(&signer.store, "U1", "ExampleRoot", None).unwrap();
    assert!(matches!(
        registry.import_identity("U1", &mock, 1),
        Err(NotaryError::TrustAnchorRejected(_))
    ));

    let vouched = export_identity(&signer.store, "U1", "ExampleRoot", Some(&root)).unwrap();
    registry.import_identity("U1", &vouched, 1).unwrap();
    assert_eq!(
        verify(&signed, &cert, &registry, None).trust_source,
        Some(TrustSource::Registry)
    );
}
