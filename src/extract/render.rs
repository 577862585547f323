//! PDF page rendering via PDFium
//!
//! `Pdfium` handles are `!Send`, so every operation binds the library
//! afresh; the OS caches the dynamic library load.

use super::ExtractError;
use image::{ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;

/// Largest width or height of a rendered page, in pixels
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch
const POINTS_PER_INCH: f32 = 72.0;

/// Rasterises PDF pages for OCR
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractError>;

    /// Render the zero-based `page` at `dpi`, returning PNG bytes
    fn render_page(&self, pdf_bytes: &[u8], page: usize, dpi: u32) -> Result<Vec<u8>, ExtractError>;
}

pub struct PdfiumRenderer {
    library: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Verify PDFium can be loaded
    ///
    /// Lookup order: `library` if given, `PDFIUM_DYNAMIC_LIB_PATH`, next to
    /// the executable, then system library paths.
    pub fn new(library: Option<PathBuf>) -> Result<Self, ExtractError> {
        let renderer = Self { library };
        renderer.load()?;
        Ok(renderer)
    }

    fn load(&self) -> Result<Pdfium, ExtractError> {
        let explicit = self
            .library
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .or_else(|| std::env::var("PDFIUM_DYNAMIC_LIB_PATH").ok());

        if let Some(path) = explicit {
            tracing::debug!(path = %path, "Loading PDFium from explicit path");
            let bindings = Pdfium::bind_to_library(&path).map_err(|e| ExtractError::Rendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            })?;
            return Ok(Pdfium::new(bindings));
        }

        if let Ok(exe) = std::env::current_exe()
            && let Some(exe_dir) = exe.parent()
        {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                tracing::debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }

        let bindings = Pdfium::bind_to_system_library().map_err(|e| ExtractError::Rendering {
            page: 0,
            reason: format!(
                "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
            ),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

fn map_load_error(e: PdfiumError) -> ExtractError {
    ExtractError::PdfParsing(format!("Failed to load PDF for rendering: {e}"))
}

/// Pixel size for a page, capped at [`MAX_DIMENSION_PX`] keeping aspect ratio
fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let raw_w = (width_points * dpi as f32 / POINTS_PER_INCH).max(1.0);
    let raw_h = (height_points * dpi as f32 / POINTS_PER_INCH).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractError> {
        let pdfium = self.load()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(&self, pdf_bytes: &[u8], page: usize, dpi: u32) -> Result<Vec<u8>, ExtractError> {
        let rendering_error = |reason: String| ExtractError::Rendering { page, reason };

        let pdfium = self.load()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let index = u16::try_from(page)
            .map_err(|_| rendering_error(format!("Page index {page} exceeds u16 maximum")))?;
        let pdf_page = pages.get(index).map_err(|_| {
            rendering_error(format!(
                "Page {page} out of range (document has {} pages)",
                pages.len()
            ))
        })?;

        let (width, height) =
            render_dimensions(pdf_page.width().value, pdf_page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| rendering_error(format!("Rendering failed: {e}")))?;

        let (bitmap_w, bitmap_h) = (bitmap.width() as u32, bitmap.height() as u32);
        let rgba = RgbaImage::from_raw(bitmap_w, bitmap_h, bitmap.as_rgba_bytes())
            .ok_or_else(|| rendering_error("Bitmap size does not match its pixels".to_string()))?;

        let mut cursor = Cursor::new(Vec::new());
        rgba.write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| rendering_error(format!("PNG encoding failed: {e}")))?;
        let png = cursor.into_inner();

        tracing::debug!(
            page,
            width = bitmap_w,
            height = bitmap_h,
            png_size = png.len(),
            "Rendered PDF page to PNG"
        );

        Ok(png)
    }
}

/// Renderer returning a tiny blank PNG for each page, for tests without PDFium
pub struct MockPageRenderer {
    page_count: usize,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PageRenderer for MockPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractError> {
        Ok(self.page_count)
    }

    fn render_page(&self, _pdf_bytes: &[u8], page: usize, _dpi: u32) -> Result<Vec<u8>, ExtractError> {
        if page >= self.page_count {
            return Err(ExtractError::Rendering {
                page,
                reason: format!("Page {page} out of range"),
            });
        }
        let mut cursor = Cursor::new(Vec::new());
        RgbaImage::new(1, 1)
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| ExtractError::Rendering {
                page,
                reason: e.to_string(),
            })?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_page_at_300_dpi() {
        assert_eq!(render_dimensions(612.0, 792.0, 300), (2550, 3300));
    }

    #[test]
    fn test_dimensions_capped() {
        let (w, h) = render_dimensions(612.0, 792.0, 1200);
        assert!(h <= MAX_DIMENSION_PX && h >= MAX_DIMENSION_PX - 1);
        assert!(w < h);
    }

    #[test]
    fn test_degenerate_page() {
        assert_eq!(render_dimensions(0.0, 0.0, 300), (1, 1));
    }

    #[test]
    fn test_mock_renders_png() {
        let renderer = MockPageRenderer::new(2);
        assert_eq!(renderer.page_count(b"").unwrap(), 2);
        let png = renderer.render_page(b"", 1, 300).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
        assert!(renderer.render_page(b"", 2, 300).is_err());
    }
}
