//! Optical character recognition

use super::ExtractError;

/// Turns a page image into text
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, png: &[u8]) -> Result<String, ExtractError>;
}

/// Tesseract through libtesseract
///
/// Only available when compiled with the `ocr` feature. A fresh Tesseract
/// handle is created per page, so the engine itself is freely shareable.
#[cfg(feature = "ocr")]
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    tessdata_dir: Option<String>,
    lang: String,
    dpi: u32,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    /// `tessdata_dir` of `None` leaves the lookup to libtesseract
    /// (`TESSDATA_PREFIX` or its compiled-in default). An explicit directory
    /// must hold a `.traineddata` file for every language in `lang`
    /// (e.g. "eng+fra").
    pub fn new(
        tessdata_dir: Option<&std::path::Path>,
        lang: &str,
        dpi: u32,
    ) -> Result<Self, ExtractError> {
        let tessdata_dir = match tessdata_dir {
            Some(dir) => {
                for code in lang.split('+').filter(|code| !code.is_empty()) {
                    let traineddata = dir.join(format!("{code}.traineddata"));
                    if !traineddata.exists() {
                        return Err(ExtractError::Ocr(format!(
                            "{} not found",
                            traineddata.display()
                        )));
                    }
                }
                let dir = dir.to_str().ok_or_else(|| {
                    ExtractError::Ocr(format!("invalid tessdata path: {}", dir.display()))
                })?;
                Some(dir.to_string())
            }
            None => None,
        };

        Ok(Self {
            tessdata_dir,
            lang: lang.to_string(),
            dpi,
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn recognize(&self, png: &[u8]) -> Result<String, ExtractError> {
        let lang = Some(self.lang.as_str());
        let tess = tesseract::Tesseract::new(self.tessdata_dir.as_deref(), lang)
            .map_err(|e| ExtractError::Ocr(format!("Tesseract init failed: {e}")))?;

        let mut tess = tess
            .set_image_from_mem(png)
            .map_err(|e| ExtractError::Ocr(format!("Tesseract rejected image: {e}")))?
            .set_source_resolution(self.dpi as i32);

        tess.get_text()
            .map_err(|e| ExtractError::Ocr(format!("Tesseract recognition failed: {e}")))
    }
}

/// Returns fixed text for every image, for tests without tesseract
pub struct MockOcrEngine {
    pub text: String,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _png: &[u8]) -> Result<String, ExtractError> {
        Ok(self.text.clone())
    }
}
