//! # rtw-check
//!
//! Read a UK Right to Work share code and date of birth off uploaded
//! documents, then run the online check and save the result PDF.
//!
//! ## Why this crate?
//!
//! Share-code letters and passports arrive as text PDFs, scans and phone
//! photos. Regexes over a PDF text layer are free and exact when the layer
//! exists; a multimodal model reads anything but costs money and time. This
//! crate tries the cheap path first and escalates to the model only for the
//! fields that are still missing or doubtful.
//!
//! ## Pipeline Overview
//!
//! ```text
//! share-code doc + DOB doc
//!  │
//!  ├─ 1. Classify  PDF / text / image, size cap
//!  ├─ 2. Text      first pages' text layer via pdfium (spawn_blocking)
//!  ├─ 3. Match     share-code and date regexes, label-proximity scores
//!  ├─ 4. Vision    page 1 + bands → fast model, strong model if incomplete
//!  └─ 5. Merge     ExtractionResult with per-field confidence and source
//!
//! RunRequest
//!  │
//!  ├─ 1. Validate  9-char code, DOB, company name
//!  ├─ 2. Drive     start → share code → DOB → company → download
//!  └─ 3. Save      RTW-Check-<tag>.pdf (+ trace, screenshot on failure)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtw_check::{extract_files, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision fallback is active when GEMINI_API_KEY is set.
//!     let config = ExtractionConfig::from_env()?;
//!     let result = extract_files("share-code.pdf", "passport.jpg", &config).await?;
//!     println!("{} {}/{}/{}", result.share_code_display,
//!         result.dob_day, result.dob_month, result.dob_year);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rtw` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! rtw-check = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod automation;
pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use automation::{run_check, BrowserLauncher, BrowserSession, SiteErrorKind, WebDriverLauncher};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, RunConfig, RunConfigBuilder, VisionConfig};
pub use error::{BrowserError, RtwError, RunError, VisionError};
pub use extract::{extract_fields, extract_fields_sync, extract_fields_with, extract_files};
pub use fields::{DateOfBirth, ShareCode};
pub use output::{
    ExtractionCandidate, ExtractionResult, FieldConfidence, RunFailureKind, RunRequest, RunResult, Source,
};
pub use pipeline::document::DocumentInput;
pub use pipeline::pdfium::pdfium_available;
pub use pipeline::vision::{VisionClient, VisionModel};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
