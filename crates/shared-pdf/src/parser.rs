//! PDF parsing using lopdf

use crate::error::PdfError;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Inheritable page attributes can sit this many levels up the page tree
const MAX_TREE_DEPTH: usize = 32;

/// Wrapper around lopdf::Document with page-level accessors
pub struct PdfDocument {
    pub(crate) doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        Ok(Self { doc })
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Get the number of pages
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Get page object ID for a given page number (1-indexed)
    pub fn page_id(&self, page_num: u32) -> Option<ObjectId> {
        self.doc.get_pages().get(&page_num).copied()
    }

    /// Decoded content of a page, all content streams concatenated in order.
    ///
    /// A page without content streams yields an empty buffer.
    pub fn page_content(&self, page_num: u32) -> Result<Vec<u8>, PdfError> {
        let page_id = self
            .page_id(page_num)
            .ok_or(PdfError::PageNotFound(page_num))?;
        Ok(self.doc.get_page_content(page_id)?)
    }

    /// Get page dimensions (MediaBox) as [x, y, width, height]
    pub fn page_dimensions(&self, page_num: u32) -> Result<[f64; 4], PdfError> {
        let page_id = self
            .page_id(page_num)
            .ok_or(PdfError::PageNotFound(page_num))?;

        match self.inherited_attribute(page_id, b"MediaBox")? {
            Some(media_box) => self.parse_rect(media_box),
            // Default to US Letter size
            None => Ok([0.0, 0.0, 612.0, 792.0]),
        }
    }

    /// Look up an inheritable page attribute, walking up through Parent links
    pub(crate) fn inherited_attribute(
        &self,
        page_id: ObjectId,
        key: &[u8],
    ) -> Result<Option<&Object>, PdfError> {
        let mut node = self.doc.get_object(page_id)?.as_dict()?;

        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(key) {
                return Ok(Some(value));
            }
            match node.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent_id) => node = self.doc.get_object(parent_id)?.as_dict()?,
                Err(_) => return Ok(None),
            }
        }

        Err(PdfError::Structure("page tree too deep".to_string()))
    }

    /// Resolve a reference to the object it points at
    pub(crate) fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object, PdfError> {
        match obj {
            Object::Reference(id) => Ok(self.doc.get_object(*id)?),
            other => Ok(other),
        }
    }

    /// Resolve an object that should be a dictionary
    pub(crate) fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Result<&'a Dictionary, PdfError> {
        Ok(self.resolve(obj)?.as_dict()?)
    }

    /// The document catalog
    pub(crate) fn catalog(&self) -> Result<&Dictionary, PdfError> {
        let root = self.doc.trailer.get(b"Root")?;
        self.resolve_dict(root)
    }

    /// Parse a PDF rectangle array into [x, y, width, height]
    fn parse_rect(&self, obj: &Object) -> Result<[f64; 4], PdfError> {
        let arr = self.resolve(obj)?.as_array().map_err(|_| {
            PdfError::Structure("MediaBox is not an array".to_string())
        })?;

        if arr.len() != 4 {
            return Err(PdfError::Structure(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }

        // Convert from [x1, y1, x2, y2] to [x, y, width, height]
        Ok([
            values[0].min(values[2]),
            values[1].min(values[3]),
            (values[2] - values[0]).abs(),
            (values[3] - values[1]).abs(),
        ])
    }

    /// Extract a number from a PDF object
    fn extract_number(&self, obj: &Object) -> Result<f64, PdfError> {
        match self.resolve(obj)? {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r as f64),
            _ => Err(PdfError::Structure(
                "Expected number in rectangle".to_string(),
            )),
        }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Get mutable access to the internal document
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Save the document to bytes
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(buffer)
    }
}
