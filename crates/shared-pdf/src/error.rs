use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("Page {0} not found")]
    PageNotFound(u32),

    #[error("PDF structure error: {0}")]
    Structure(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),

    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("Unsupported signature image: {0}")]
    Image(String),

    #[error("Certificate metadata corrupted or missing: {0}")]
    CertificateParse(String),

    #[error(transparent)]
    Lopdf(#[from] lopdf::Error),
}
