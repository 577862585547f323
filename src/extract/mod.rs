//! Document-to-text extraction
//!
//! Plain text is decoded leniently. PDFs go through their text layer first;
//! when that yields too little text (typically a scanned document) every
//! page is rendered and run through OCR instead.

pub mod kind;
pub mod ocr;
pub mod pdf;
pub mod render;

pub use kind::DocumentKind;
#[cfg(feature = "ocr")]
pub use ocr::TesseractEngine;
pub use ocr::{MockOcrEngine, OcrEngine};
pub use pdf::{LopdfTextSource, PdfTextSource};
pub use render::{MockPageRenderer, PageRenderer, PdfiumRenderer};

use crate::config::ExtractionConfig;
use crate::text::{clean_ocr_text, clean_text, visible_chars};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    UnsupportedFormat(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("rendering page {page} failed: {reason}")]
    Rendering { page: usize, reason: String },

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How the text was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PlainText,
    PdfText,
    Ocr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub method: ExtractionMethod,
    /// Pages in the source document (1 for plain text)
    pub page_count: usize,
}

/// Separator placed between pages
const PAGE_SEPARATOR: &str = "\n\n";

/// Converts uploaded bytes into context text
pub struct DocumentExtractor {
    config: ExtractionConfig,
    text_source: Arc<dyn PdfTextSource>,
    renderer: Option<Arc<dyn PageRenderer>>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl DocumentExtractor {
    /// Extractor backed by lopdf, PDFium and libtesseract
    ///
    /// A missing PDFium library, missing tessdata or a build without the
    /// `ocr` feature disables the OCR fallback with a warning rather than
    /// failing startup.
    pub fn new(config: ExtractionConfig) -> Self {
        let ocr = if config.ocr_enabled {
            default_ocr_engine(&config)
        } else {
            None
        };
        let renderer = match &ocr {
            Some(_) => match PdfiumRenderer::new(config.pdfium_library.clone()) {
                Ok(renderer) => Some(Arc::new(renderer) as Arc<dyn PageRenderer>),
                Err(e) => {
                    tracing::warn!(error = %e, "PDFium unavailable, OCR fallback disabled");
                    None
                }
            },
            None => None,
        };

        Self {
            config,
            text_source: Arc::new(LopdfTextSource),
            renderer,
            ocr,
        }
    }

    /// Extractor with explicit components
    pub fn with_components(
        config: ExtractionConfig,
        text_source: Arc<dyn PdfTextSource>,
        renderer: Option<Arc<dyn PageRenderer>>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Self {
        Self {
            config,
            text_source,
            renderer,
            ocr,
        }
    }

    pub fn ocr_available(&self) -> bool {
        self.config.ocr_enabled && self.renderer.is_some() && self.ocr.is_some()
    }

    /// Detect the document kind from upload hints and extract its text
    pub fn extract_upload(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractError> {
        let kind = DocumentKind::detect(content_type, filename, bytes)?;
        self.extract(bytes, kind)
    }

    pub fn extract(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
    ) -> Result<ExtractedDocument, ExtractError> {
        match kind {
            DocumentKind::PlainText => Ok(ExtractedDocument {
                text: clean_text(&String::from_utf8_lossy(bytes)),
                method: ExtractionMethod::PlainText,
                page_count: 1,
            }),
            DocumentKind::Pdf => self.extract_pdf(bytes),
        }
    }

    fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
        let pages = self.text_source.page_texts(bytes)?;
        let page_count = pages.len();
        let text = clean_text(&pages.join(PAGE_SEPARATOR));
        let chars = visible_chars(&text);

        if chars >= self.config.min_text_chars {
            tracing::debug!(pages = page_count, chars, "Extracted PDF text layer");
            return Ok(ExtractedDocument {
                text,
                method: ExtractionMethod::PdfText,
                page_count,
            });
        }

        let (Some(renderer), Some(ocr), true) = (&self.renderer, &self.ocr, self.config.ocr_enabled)
        else {
            if chars == 0 {
                return Err(ExtractError::Ocr(
                    "document has no text layer and OCR is unavailable".to_string(),
                ));
            }
            tracing::warn!(chars, "Little text extracted and OCR unavailable, using text layer");
            return Ok(ExtractedDocument {
                text,
                method: ExtractionMethod::PdfText,
                page_count,
            });
        };

        tracing::info!(
            chars,
            threshold = self.config.min_text_chars,
            "Minimal text extracted, falling back to OCR"
        );

        let render_pages = renderer.page_count(bytes)?;
        let mut ocr_pages = Vec::with_capacity(render_pages);
        for page in 0..render_pages {
            let image = renderer.render_page(bytes, page, self.config.render_dpi)?;
            let page_text = ocr.recognize(&image)?;
            tracing::debug!(page, chars = page_text.len(), "OCR page done");
            ocr_pages.push(page_text);
        }

        crate::metrics::record_ocr_fallback(render_pages);

        Ok(ExtractedDocument {
            text: clean_ocr_text(&ocr_pages.join(PAGE_SEPARATOR)),
            method: ExtractionMethod::Ocr,
            page_count: render_pages,
        })
    }
}

#[cfg(feature = "ocr")]
fn default_ocr_engine(config: &ExtractionConfig) -> Option<Arc<dyn OcrEngine>> {
    match TesseractEngine::new(
        config.tessdata_dir.as_deref(),
        &config.ocr_lang,
        config.render_dpi,
    ) {
        Ok(engine) => Some(Arc::new(engine) as Arc<dyn OcrEngine>),
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract unavailable, OCR fallback disabled");
            None
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn default_ocr_engine(_config: &ExtractionConfig) -> Option<Arc<dyn OcrEngine>> {
    tracing::warn!("Built without the ocr feature, OCR fallback disabled");
    None
}

#[cfg(test)]
pub(crate) mod test_pdf {
    //! Minimal PDFs built with lopdf

    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    /// One page per entry; `None` pages carry no text at all
    pub fn make_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for text in pages {
            let content = match text {
                Some(text) => format!("BT /F1 12 Tf 72 700 Td ({text}) Tj ET"),
                None => String::new(),
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
