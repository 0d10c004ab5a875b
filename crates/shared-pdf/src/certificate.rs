//! Certificate PDF rendering and parsing
//!
//! A certificate carries its signing metadata twice:
//! - as a JSON attachment ([`CERTIFICATE_ATTACHMENT`]) that parsers read first
//! - as labelled lines on the page (`AUTH ID:`, `NONCE TS:`, `PAGE HASHES:`,
//!   `SOVEREIGN SIGNATURE:`, `CERT SHARD:`), which is all older certificates
//!   have. These labels are a compatibility surface and must not change.
//!
//! Long values wrap onto continuation lines. Continuation lines never contain
//! spaces (hex, base64 and manifests don't), which is how the text parser tells
//! them apart from prose.

use crate::builder::{text_line, DocumentBuilder, COURIER, HELVETICA};
use crate::error::PdfError;
use crate::parser::PdfDocument;
use lazy_static::lazy_static;
use lopdf::content::{Content, Operation};
use lopdf::Object;
use regex::Regex;
use shared_types::CertificateRecord;
use tracing::{debug, warn};

/// Name of the embedded JSON attachment
pub const CERTIFICATE_ATTACHMENT: &str = "notary-certificate.json";

pub const LABEL_AUTH_ID: &str = "AUTH ID";
pub const LABEL_NONCE_TS: &str = "NONCE TS";
pub const LABEL_PAGE_HASHES: &str = "PAGE HASHES";
pub const LABEL_SIGNATURE: &str = "SOVEREIGN SIGNATURE";
pub const LABEL_CERT_SHARD: &str = "CERT SHARD";
pub const LABEL_KEY_EPOCH: &str = "KEY EPOCH";

const END_MARKER: &str = "END OF CERTIFICATE";

const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 48.0;
const FIELD_FONT_SIZE: f64 = 8.0;
const LEADING: f64 = 11.0;
/// Courier at 8pt is 4.8pt per glyph; 96 glyphs fit inside the margins
const WRAP_COLUMNS: usize = 96;

lazy_static! {
    static ref FIELD_LINE: Regex = Regex::new(
        r"^(AUTH ID|NONCE TS|PAGE HASHES|SOVEREIGN SIGNATURE|CERT SHARD|KEY EPOCH):\s*(.*)$"
    )
    .unwrap();
}

/// Lays out lines top to bottom, starting new pages as needed
struct PageWriter {
    pages: Vec<Vec<Operation>>,
    y: f64,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn line(&mut self, font: &str, size: f64, text: &str) {
        if self.y < MARGIN {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT - MARGIN;
        }
        if let Some(page) = self.pages.last_mut() {
            page.extend(text_line(font, size, MARGIN, self.y, text));
        }
        self.y -= size.max(FIELD_FONT_SIZE) + LEADING - FIELD_FONT_SIZE;
    }

    fn gap(&mut self) {
        self.y -= LEADING;
    }

    fn field(&mut self, label: &str, value: &str) {
        let first_width = WRAP_COLUMNS.saturating_sub(label.len() + 2).max(1);
        let chars: Vec<char> = value.chars().collect();
        let (first, rest) = chars.split_at(first_width.min(chars.len()));

        let first: String = first.iter().collect();
        self.line(COURIER, FIELD_FONT_SIZE, &format!("{}: {}", label, first));
        for chunk in rest.chunks(WRAP_COLUMNS) {
            let chunk: String = chunk.iter().collect();
            self.line(COURIER, FIELD_FONT_SIZE, &chunk);
        }
    }
}

/// Render a certificate PDF for a signing record
pub fn render_certificate(record: &CertificateRecord) -> Result<Vec<u8>, PdfError> {
    let mut writer = PageWriter::new();
    writer.line(HELVETICA, 18.0, "SOVEREIGN NOTARY CERTIFICATE");
    writer.gap();
    writer.line(
        HELVETICA,
        10.0,
        "This certificate attests to the visible content of each page of the signed document.",
    );
    writer.line(
        HELVETICA,
        10.0,
        "Verify it against the signed PDF; any edit to a page invalidates the attestation.",
    );
    writer.gap();

    writer.field(LABEL_AUTH_ID, &record.signer_id);
    writer.field(LABEL_NONCE_TS, &record.timestamp_ms.to_string());
    if let Some(epoch) = record.key_epoch {
        writer.field(LABEL_KEY_EPOCH, &epoch.to_string());
    }
    writer.field(LABEL_PAGE_HASHES, &record.manifest);
    writer.field(LABEL_SIGNATURE, &record.signature);
    if let Some(shard) = &record.cert_shard {
        writer.field(LABEL_CERT_SHARD, shard);
    }
    writer.line(COURIER, FIELD_FONT_SIZE, END_MARKER);

    let mut builder = DocumentBuilder::new();
    for operations in writer.pages {
        builder.add_page(PAGE_WIDTH, PAGE_HEIGHT, operations)?;
    }

    let json = serde_json::to_vec(record).map_err(|e| PdfError::Save(e.to_string()))?;
    builder.attach_file(CERTIFICATE_ATTACHMENT, "application/json", json);
    builder.finish()
}

/// Recover the signing record from a certificate PDF
pub fn parse_certificate(bytes: &[u8]) -> Result<CertificateRecord, PdfError> {
    let pdf = PdfDocument::from_bytes(bytes)
        .map_err(|e| PdfError::CertificateParse(e.to_string()))?;

    match read_attachment(&pdf) {
        Ok(Some(json)) => match serde_json::from_slice::<CertificateRecord>(&json) {
            Ok(record) => {
                debug!(signer = %record.signer_id, "Read certificate from attachment");
                return Ok(record);
            }
            Err(e) => warn!("Certificate attachment is not valid JSON, using text layer: {}", e),
        },
        Ok(None) => debug!("Certificate has no attachment, using text layer"),
        Err(e) => warn!("Could not read certificate attachment, using text layer: {}", e),
    }

    parse_certificate_text(&extract_text_lines(&pdf))
}

/// Parse the labelled lines of a certificate's text layer
pub fn parse_certificate_text(lines: &[String]) -> Result<CertificateRecord, PdfError> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in lines {
        let line = line.trim();
        if line == END_MARKER {
            break;
        }
        if let Some(caps) = FIELD_LINE.captures(line) {
            fields.push((caps[1].to_string(), caps[2].trim().to_string()));
        } else if let Some((_, value)) = fields.last_mut() {
            if !line.is_empty() && !line.contains(' ') {
                value.push_str(line);
            }
        }
    }

    let field = |label: &str| {
        fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };
    let required = |label: &str| {
        field(label).ok_or_else(|| PdfError::CertificateParse(format!("missing {}", label)))
    };

    let timestamp_ms = required(LABEL_NONCE_TS)?
        .parse::<i64>()
        .map_err(|e| PdfError::CertificateParse(format!("bad {}: {}", LABEL_NONCE_TS, e)))?;
    let key_epoch = match field(LABEL_KEY_EPOCH) {
        Some(v) => Some(v.parse::<u32>().map_err(|e| {
            PdfError::CertificateParse(format!("bad {}: {}", LABEL_KEY_EPOCH, e))
        })?),
        None => None,
    };

    Ok(CertificateRecord {
        signer_id: required(LABEL_AUTH_ID)?,
        timestamp_ms,
        manifest: required(LABEL_PAGE_HASHES)?,
        signature: required(LABEL_SIGNATURE)?,
        cert_shard: field(LABEL_CERT_SHARD),
        key_epoch,
    })
}

/// One line per text-showing operator, pages in order
pub fn extract_text_lines(pdf: &PdfDocument) -> Vec<String> {
    let mut lines = Vec::new();
    for page_num in 1..=pdf.page_count() as u32 {
        let Ok(content) = pdf.page_content(page_num) else {
            continue;
        };
        let Ok(content) = Content::decode(&content) else {
            continue;
        };
        for op in content.operations {
            match op.operator.as_str() {
                "Tj" | "TJ" | "'" | "\"" => {
                    if let Some(operand) = op.operands.last() {
                        lines.push(operand_text(operand));
                    }
                }
                _ => {}
            }
        }
    }
    lines
}

fn operand_text(operand: &Object) -> String {
    match operand {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        Object::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
                _ => None,
            })
            .collect(),
        _ => String::new(),
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    // UTF-16BE with BOM
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Fallback to Latin-1
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn read_attachment(pdf: &PdfDocument) -> Result<Option<Vec<u8>>, PdfError> {
    let catalog = pdf.catalog()?;
    let Ok(names) = catalog.get(b"Names") else {
        return Ok(None);
    };
    let Ok(embedded) = pdf.resolve_dict(names)?.get(b"EmbeddedFiles") else {
        return Ok(None);
    };
    let Ok(entries) = pdf.resolve_dict(embedded)?.get(b"Names") else {
        return Ok(None);
    };
    let entries = pdf.resolve(entries)?.as_array()?;

    for pair in entries.chunks_exact(2) {
        let name = match pdf.resolve(&pair[0])? {
            Object::String(bytes, _) => decode_pdf_string(bytes),
            _ => continue,
        };
        if name != CERTIFICATE_ATTACHMENT {
            continue;
        }

        let filespec = pdf.resolve_dict(&pair[1])?;
        let ef = pdf.resolve_dict(filespec.get(b"EF")?)?;
        let stream = pdf.resolve(ef.get(b"F")?)?.as_stream()?;
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        return Ok(Some(data));
    }
    Ok(None)
}
