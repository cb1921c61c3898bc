//! Uploaded documents: classification, size checks and text-layer reading.
//!
//! A document is one of three things:
//!
//! * a **PDF** (detected by its `%PDF` magic, not its name), whose first
//!   pages may carry a text layer and can be rendered for the vision model;
//! * a **plain-text** file (`.txt`), treated as an already-extracted text layer;
//! * an **image** (photo or scan), passed to the vision model unchanged.
//!
//! Text-layer reading is best-effort by contract: a page that fails is
//! skipped, an encrypted or unreadable PDF gives empty text. Only a missing
//! PDFium library or a panicked worker surfaces as an error.

use crate::error::RtwError;
use crate::pipeline::pdfium::{load_pdfium, map_load_error};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What kind of content a [`DocumentInput`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// No bytes at all.
    Empty,
    Pdf,
    /// UTF-8 text with a `.txt` name.
    Text,
    /// Anything else, sent to the vision model as-is.
    Image { mime: &'static str },
}

/// Raw bytes of one uploaded document plus its original filename.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    bytes: Arc<[u8]>,
    filename: String,
}

impl DocumentInput {
    pub fn new(bytes: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    /// A document with no content (the caller uploaded nothing).
    pub fn empty() -> Self {
        Self::new(Vec::new(), "")
    }

    /// Read a document from disk, keeping its file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, RtwError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RtwError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(bytes, filename))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject documents above `limit` bytes.
    ///
    /// `label` names the document in the error message
    /// (`"Share code document"`).
    pub fn check_size(&self, label: &str, limit: usize) -> Result<(), RtwError> {
        if self.len() > limit {
            return Err(RtwError::DocumentTooLarge {
                label: label.to_string(),
                size: self.len(),
                limit,
            });
        }
        Ok(())
    }

    pub fn kind(&self) -> DocumentKind {
        if self.bytes.is_empty() {
            return DocumentKind::Empty;
        }
        if is_pdf_bytes(&self.bytes) {
            return DocumentKind::Pdf;
        }
        let ext = extension(&self.filename);
        if ext == "txt" && std::str::from_utf8(&self.bytes).is_ok() {
            return DocumentKind::Text;
        }
        DocumentKind::Image {
            mime: image_mime(&ext, &self.bytes),
        }
    }

    /// Text layer of the first `max_pages` pages, or `""` when there is none.
    pub async fn text_layer(&self, max_pages: usize) -> Result<String, RtwError> {
        match self.kind() {
            DocumentKind::Pdf => {
                let bytes = self.shared_bytes();
                let text = tokio::task::spawn_blocking(move || pdf_text_blocking(&bytes, max_pages))
                    .await
                    .map_err(|e| RtwError::Internal(format!("Text task panicked: {e}")))??;
                info!(
                    file = %self.filename,
                    chars = text.chars().count(),
                    "PDF text layer read"
                );
                Ok(text)
            }
            DocumentKind::Text => Ok(String::from_utf8_lossy(&self.bytes).trim().to_string()),
            DocumentKind::Image { .. } | DocumentKind::Empty => Ok(String::new()),
        }
    }
}

/// `%PDF` after optional leading whitespace.
pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"%PDF")
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// MIME type for an image upload: extension first, then magic bytes,
/// PNG when neither says otherwise.
fn image_mime(ext: &str, bytes: &[u8]) -> &'static str {
    match ext {
        "jpg" | "jpeg" => return "image/jpeg",
        "webp" => return "image/webp",
        "png" => return "image/png",
        _ => {}
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "image/png",
    }
}

/// Blocking text extraction; page failures are skipped.
fn pdf_text_blocking(bytes: &[u8], max_pages: usize) -> Result<String, RtwError> {
    let pdfium = load_pdfium()?;
    let document = match pdfium.load_pdf_from_byte_slice(bytes, None) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("No text layer: {}", map_load_error(e));
            return Ok(String::new());
        }
    };

    let pages = document.pages();
    let total = pages.len() as usize;
    let mut parts: Vec<String> = Vec::new();

    for idx in 0..total.min(max_pages) {
        let text = pages
            .get(idx as u16)
            .and_then(|page| page.text().map(|t| t.all()));
        match text {
            Ok(t) if !t.trim().is_empty() => parts.push(t),
            Ok(_) => debug!("Page {} has no text layer", idx + 1),
            Err(e) => warn!("Skipping text of page {}: {:?}", idx + 1, e),
        }
    }

    Ok(parts.join("\n").trim().to_string())
}
