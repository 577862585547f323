//! PDF text-layer extraction

use super::ExtractError;
use lopdf::Document;

/// Reads the embedded text of each page
pub trait PdfTextSource: Send + Sync {
    /// Text per page, in page order
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// Text extraction with lopdf
///
/// Only a document that cannot be parsed at all is an error. A page whose
/// content cannot be decoded contributes no text, which pushes image-only
/// documents towards the OCR fallback.
pub struct LopdfTextSource;

impl PdfTextSource for LopdfTextSource {
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractError::PdfParsing(format!("Failed to parse PDF: {e}")))?;

        if doc.is_encrypted() {
            return Err(ExtractError::PdfParsing(
                "PDF is encrypted and cannot be read".to_string(),
            ));
        }

        let pages = doc.get_pages();
        let texts = pages
            .keys()
            .map(|&number| match doc.extract_text(&[number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(page = number, error = %e, "Could not extract page text");
                    String::new()
                }
            })
            .collect();

        Ok(texts)
    }
}
