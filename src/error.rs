//! Error types for the rtw-check library.
//!
//! Four error types reflect four distinct failure surfaces:
//!
//! * [`RtwError`] — **Fatal** for the extraction entry point: the request
//!   cannot be processed at all (bad configuration, oversized upload, an
//!   internal task panicked). Expected empty outcomes (no text layer, no
//!   match, vision unavailable) are *not* errors; they come back as
//!   zero-confidence fields in [`crate::output::ExtractionResult`].
//!
//! * [`VisionError`] — one model tier failed. The vision client absorbs
//!   these into notes; only a failure of every tier reaches the orchestrator,
//!   which records it and carries on.
//!
//! * [`BrowserError`] — a browser primitive (navigate, find, click, print)
//!   failed. The runner decides whether that is fatal for the step.
//!
//! * [`RunError`] — why a form-filling run stopped. Never escapes the
//!   automation entry point; it is folded into
//!   [`crate::output::RunResult`] together with diagnostic artifacts.

use crate::automation::detect::SiteErrorKind;
use crate::output::RunFailureKind;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the extraction side of the library.
#[derive(Debug, Error)]
pub enum RtwError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// An uploaded document exceeds the configured size cap.
    #[error("{label} is too large ({size} bytes). Upload under {limit} bytes.")]
    DocumentTooLarge {
        label: String,
        size: usize,
        limit: usize,
    },

    /// Could not read an input file from disk.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// No PDFium library could be bound.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumUnavailable(String),

    /// PDFium could not open the document.
    #[error("PDF could not be opened: {detail}")]
    PdfLoad { detail: String },

    /// The document needs a password we do not have.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// Rendering a page to pixels failed.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// PNG encoding of a rendered image failed.
    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),

    // ── Vision errors ─────────────────────────────────────────────────────
    /// The configured provider could not be constructed.
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single vision-model call failed.
#[derive(Debug, Clone, Error)]
pub enum VisionError {
    /// Nothing to send: no images for either field.
    #[error("no images to send")]
    NoImages,

    /// The provider returned an error.
    #[error("{model}: {message}")]
    Api { model: String, message: String },

    /// The call did not finish within the configured timeout.
    #[error("{model}: timed out after {secs}s")]
    Timeout { model: String, secs: u64 },

    /// Every tier failed; carries the individual failures.
    #[error("all vision tiers failed: {0}")]
    AllTiersFailed(String),
}

/// A browser-session primitive failed.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// The driver could not be reached or the session could not start.
    #[error("browser session unavailable: {0}")]
    Unavailable(String),

    /// The driver answered with a protocol-level error.
    #[error("{command}: {error}: {message}")]
    Protocol {
        command: String,
        error: String,
        message: String,
    },

    /// HTTP transport failure talking to the driver or the site.
    #[error("{0}")]
    Http(String),

    /// No element matched the locator.
    #[error("no element matches {0}")]
    NotFound(String),

    /// A wait exceeded its bound.
    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    /// The driver answered with something we could not interpret.
    #[error("unexpected driver response: {0}")]
    BadResponse(String),
}

/// Why a form-filling run stopped.
#[derive(Debug, Error)]
pub enum RunError {
    /// Input rejected before any browser session started.
    #[error("{0}")]
    Validation(String),

    /// The start page kept failing to load.
    #[error("Failed to load {url}: {detail}")]
    Navigation { url: String, detail: String },

    /// Every selector strategy for a field or button was exhausted.
    #[error("{what} not found")]
    ElementNotFound { what: String },

    /// The site showed its own error summary.
    #[error("Site reported an error: {message}")]
    SiteReported { kind: SiteErrorKind, message: String },

    /// The result PDF could not be retrieved.
    #[error("Download failed: {0}")]
    Download(String),

    /// A step exceeded its overall time budget.
    #[error("Step '{step}' timed out after {secs}s")]
    StepTimeout { step: String, secs: u64 },

    /// The browser session failed underneath a step.
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// Local file-system failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// The coarse class reported in [`crate::output::RunResult::failure`].
    pub fn kind(&self) -> RunFailureKind {
        match self {
            RunError::Validation(_) => RunFailureKind::Validation,
            RunError::Navigation { .. } => RunFailureKind::Navigation,
            RunError::ElementNotFound { .. } => RunFailureKind::ElementNotFound,
            RunError::SiteReported { kind, .. } => RunFailureKind::SiteReported(*kind),
            RunError::Download(_) => RunFailureKind::Download,
            RunError::StepTimeout { .. } => RunFailureKind::Timeout,
            RunError::Browser(BrowserError::Timeout { .. }) => RunFailureKind::Timeout,
            RunError::Browser(_) => RunFailureKind::Browser,
            RunError::Io { .. } => RunFailureKind::Io,
        }
    }
}
