//! Upload type detection

use super::ExtractError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Documents we can turn into text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    fn from_mime(essence: &str) -> Option<Self> {
        match essence {
            "application/pdf" => Some(Self::Pdf),
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Decide the kind from the upload's file name, declared content type
    /// and leading bytes
    ///
    /// A file name extension wins when present. Generic or missing content
    /// types fall back to sniffing the PDF header.
    pub fn detect(
        content_type: Option<&str>,
        filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<Self, ExtractError> {
        if let Some(name) = filename.filter(|name| name.contains('.')) {
            let guessed = mime_guess::from_path(name).first();
            return match guessed.as_ref().and_then(|mime| Self::from_mime(mime.essence_str())) {
                Some(kind) => Ok(kind),
                None => Err(ExtractError::UnsupportedFormat(extension(name))),
            };
        }

        let essence = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty());

        match essence.as_deref() {
            Some(ct) => match Self::from_mime(ct) {
                Some(kind) => Ok(kind),
                None if ct == "application/octet-stream" && bytes.starts_with(PDF_MAGIC) => {
                    Ok(Self::Pdf)
                }
                None => Err(ExtractError::UnsupportedFormat(ct.to_string())),
            },
            None if bytes.starts_with(PDF_MAGIC) => Ok(Self::Pdf),
            None => Err(ExtractError::UnsupportedFormat("unknown".to_string())),
        }
    }
}

fn extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_ascii_lowercase()),
        None => name.to_string(),
    }
}
