//! Minimal PDF writer for generated artifacts
//!
//! Pages share a single resource dictionary on the page tree root holding the
//! two standard fonts the notary draws with.

use crate::error::PdfError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Resource name of the Helvetica font on generated pages
pub const HELVETICA: &str = "F1";

/// Resource name of the Courier font on generated pages
pub const COURIER: &str = "F2";

struct Attachment {
    name: String,
    mime: String,
    bytes: Vec<u8>,
}

/// Builds a new PDF page by page
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    attachments: Vec<Attachment>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Add a page drawing the given operations
    pub fn add_page(
        &mut self,
        width: f64,
        height: f64,
        operations: Vec<Operation>,
    ) -> Result<ObjectId, PdfError> {
        let content = Content { operations }
            .encode()
            .map_err(|e| PdfError::Save(e.to_string()))?;
        let content_id = self
            .doc
            .add_object(Stream::new(lopdf::Dictionary::new(), content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box(width, height),
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(page_id)
    }

    /// Add a page with no content stream at all
    pub fn add_blank_page(&mut self, width: f64, height: f64) -> ObjectId {
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box(width, height),
        });
        self.kids.push(page_id.into());
        page_id
    }

    /// Attach a file through the catalog's EmbeddedFiles name tree
    pub fn attach_file(&mut self, name: &str, mime: &str, bytes: Vec<u8>) {
        self.attachments.push(Attachment {
            name: name.to_string(),
            mime: mime.to_string(),
            bytes,
        });
    }

    /// Write the catalog and page tree and serialize
    pub fn finish(mut self) -> Result<Vec<u8>, PdfError> {
        let helvetica_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let courier_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = self.doc.add_object(dictionary! {
            "Font" => dictionary! {
                HELVETICA => helvetica_id,
                COURIER => courier_id,
            },
        });

        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids.clone(),
                "Count" => count,
                "Resources" => resources_id,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };

        if !self.attachments.is_empty() {
            let mut names = Vec::new();
            for attachment in std::mem::take(&mut self.attachments) {
                let file_id = self.doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "EmbeddedFile",
                        "Subtype" => Object::Name(attachment.mime.into_bytes()),
                    },
                    attachment.bytes,
                ));
                let spec_id = self.doc.add_object(dictionary! {
                    "Type" => "Filespec",
                    "F" => Object::string_literal(attachment.name.clone()),
                    "UF" => Object::string_literal(attachment.name.clone()),
                    "EF" => dictionary! { "F" => file_id },
                });
                names.push(Object::String(
                    attachment.name.into_bytes(),
                    StringFormat::Literal,
                ));
                names.push(spec_id.into());
            }
            catalog.set(
                "Names",
                dictionary! {
                    "EmbeddedFiles" => dictionary! { "Names" => names },
                },
            );
        }

        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(buffer)
    }
}

fn media_box(width: f64, height: f64) -> Vec<Object> {
    vec![
        Object::Integer(0),
        Object::Integer(0),
        number(width),
        number(height),
    ]
}

/// Integral values as PDF integers, everything else as reals
pub(crate) fn number(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as f32)
    }
}

/// Operations drawing one line of text with a font from the shared resources
pub fn text_line(font: &str, size: f64, x: f64, y: f64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), number(size)]),
        Operation::new("Td", vec![number(x), number(y)]),
        Operation::new("Tj", vec![Object::string_literal(to_pdf_text(text))]),
        Operation::new("ET", vec![]),
    ]
}

/// Only ASCII is drawn; any other character becomes '?'
pub(crate) fn to_pdf_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PdfDocument;

    #[test]
    fn test_builder_produces_pages() {
        let mut builder = DocumentBuilder::new();
        builder
            .add_page(612.0, 792.0, text_line(HELVETICA, 12.0, 10.0, 10.0, "Hello"))
            .unwrap();
        builder.add_blank_page(612.0, 792.0);
        let bytes = builder.finish().unwrap();

        let pdf = PdfDocument::from_bytes(&bytes).unwrap();
        assert_eq!(pdf.page_count(), 2);
        assert!(pdf.page_content(2).unwrap().is_empty());
    }

    #[test]
    fn test_number_keeps_integers_integral() {
        assert!(matches!(number(612.0), Object::Integer(612)));
        assert!(matches!(number(0.5), Object::Real(r) if (r - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_non_ascii_is_replaced() {
        assert_eq!(to_pdf_text("Zoë (x)"), b"Zo? (x)".to_vec());
    }
}
