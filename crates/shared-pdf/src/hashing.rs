//! Deterministic per-page content hashing
//!
//! A page hash is SHA-256 over the page's decoded content streams followed by
//! a geometry tag `W:<w>H:<h>`. Object numbering, compression and metadata are
//! not part of the input, so re-saving a document leaves every hash intact
//! while any change to what the page draws, or to its size, does not.
//!
//! Pages without content hash the geometry tag alone, so two blank pages of
//! the same size share a hash.

use crate::error::PdfError;
use crate::parser::PdfDocument;
use shared_crypto::sha256_hex;
use shared_types::{PageHash, PageHashManifest};
use tracing::debug;

/// Geometry tag appended to the content bytes
pub fn geometry_tag(width: f64, height: f64) -> String {
    format!("W:{}H:{}", format_dimension(width), format_dimension(height))
}

/// Format like a JavaScript number: integral values without a fraction.
///
/// Values are rounded to four decimals first so that f32 MediaBox entries
/// (595.28 stored as 595.2800293) format the way they were written.
fn format_dimension(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        // avoid "-0"
        return "0".to_string();
    }
    format!("{}", rounded)
}

/// Hash one page. `page_index` is 0-based; the entry is labelled 1-based.
pub fn compute_deterministic_page_hash(
    doc: &PdfDocument,
    page_index: usize,
) -> Result<PageHash, PdfError> {
    let page_num = page_index as u32 + 1;
    let mut buffer = doc.page_content(page_num)?;
    let [_, _, width, height] = doc.page_dimensions(page_num)?;
    buffer.extend_from_slice(geometry_tag(width, height).as_bytes());

    let digest = sha256_hex(&buffer);
    debug!(page = page_num, content_len = buffer.len(), %digest, "Hashed page");
    Ok(PageHash::new(page_num, digest))
}

/// Hash every page in order
pub fn compute_manifest(doc: &PdfDocument) -> Result<PageHashManifest, PdfError> {
    let mut manifest = PageHashManifest::new();
    for index in 0..doc.page_count() {
        manifest.push(compute_deterministic_page_hash(doc, index)?);
    }
    Ok(manifest)
}

/// Parse and hash in one step
pub fn manifest_from_bytes(bytes: &[u8]) -> Result<PageHashManifest, PdfError> {
    let doc = PdfDocument::from_bytes(bytes)?;
    compute_manifest(&doc)
}
