//! Result types returned by the extraction and automation entry points.
//!
//! Everything here is plain data and `Serialize`, so a web layer can hand it
//! straight to a JSON response.

use crate::automation::detect::SiteErrorKind;
use crate::fields::{DateOfBirth, ShareCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Extraction ───────────────────────────────────────────────────────────

/// Where a candidate value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Deterministic matching over a document's text layer.
    TextLayer,
    /// A multimodal model reading rendered page images.
    Vision,
}

/// One scored guess for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCandidate<T> {
    pub value: T,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    /// Short machine-readable tag saying why this candidate scored as it did.
    pub reason: String,
    pub source: Source,
}

impl<T> ExtractionCandidate<T> {
    pub fn new(value: T, confidence: f32, reason: impl Into<String>, source: Source) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            source,
        }
    }
}

/// Keep the highest-confidence candidate; on ties the earliest one wins.
pub fn best_candidate<T, I>(candidates: I) -> Option<ExtractionCandidate<T>>
where
    I: IntoIterator<Item = ExtractionCandidate<T>>,
{
    candidates.into_iter().fold(None, |best, next| match best {
        Some(b) if b.confidence >= next.confidence => Some(b),
        _ => Some(next),
    })
}

/// Per-field scores, reasons and provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfidence {
    pub share_code: f32,
    pub dob: f32,
    pub share_reason: String,
    pub dob_reason: String,
    pub share_source: Option<Source>,
    pub dob_source: Option<Source>,
    /// At least one of the two documents had a non-empty text layer.
    pub text_layer_used: bool,
}

/// The merged outcome of one extraction request.
///
/// `ok` is always `true` for a returned value: missing fields are reported
/// as empty strings with zero confidence, not as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub ok: bool,
    /// Canonical nine characters, or empty.
    pub share_code_raw9: String,
    /// `XXX XXX XXX`, or empty.
    pub share_code_display: String,
    pub dob_day: String,
    pub dob_month: String,
    pub dob_year: String,
    pub confidence: FieldConfidence,
    /// The vision fallback was called and answered.
    pub ai_used: bool,
    /// Free-text diagnostics about the vision fallback (why it ran, which
    /// model answered, or the error it hit).
    pub ai_notes: String,
}

impl ExtractionResult {
    pub fn share_code(&self) -> Option<ShareCode> {
        ShareCode::parse(&self.share_code_raw9)
    }

    pub fn date_of_birth(&self) -> Option<DateOfBirth> {
        DateOfBirth::from_parts(&self.dob_day, &self.dob_month, &self.dob_year)
    }

    /// Both fields are present and at or above `threshold`.
    pub fn is_complete(&self, threshold: f32) -> bool {
        self.share_code().is_some()
            && self.date_of_birth().is_some()
            && self.confidence.share_code >= threshold
            && self.confidence.dob >= threshold
    }
}

// ── Automation ───────────────────────────────────────────────────────────

/// Input for one run of the online check.
///
/// Values are kept as supplied; [`RunRequest::validate`] turns them into
/// typed fields before any browser starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub share_code: String,
    pub dob_day: String,
    pub dob_month: String,
    pub dob_year: String,
    pub company_name: String,
    pub out_dir: PathBuf,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRun {
    pub share_code: ShareCode,
    pub date_of_birth: DateOfBirth,
    pub company_name: String,
}

impl RunRequest {
    pub fn new(
        share_code: &ShareCode,
        date_of_birth: &DateOfBirth,
        company_name: impl Into<String>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            share_code: share_code.as_str().to_string(),
            dob_day: date_of_birth.day_str(),
            dob_month: date_of_birth.month_str(),
            dob_year: date_of_birth.year_str(),
            company_name: company_name.into(),
            out_dir: out_dir.into(),
        }
    }

    /// Reject malformed input with a user-facing message.
    pub fn validate(&self) -> Result<ValidatedRun, String> {
        let share_code = ShareCode::parse(&self.share_code)
            .ok_or_else(|| "Invalid share code (must be 9 characters).".to_string())?;
        let company_name = self.company_name.trim();
        if self.dob_day.trim().is_empty()
            || self.dob_month.trim().is_empty()
            || self.dob_year.trim().is_empty()
            || company_name.is_empty()
        {
            return Err("Missing DOB or company name.".to_string());
        }
        let date_of_birth = DateOfBirth::from_parts(&self.dob_day, &self.dob_month, &self.dob_year)
            .ok_or_else(|| {
                format!(
                    "Invalid date of birth: {}/{}/{}",
                    self.dob_day.trim(),
                    self.dob_month.trim(),
                    self.dob_year.trim()
                )
            })?;
        Ok(ValidatedRun {
            share_code,
            date_of_birth,
            company_name: company_name.to_string(),
        })
    }
}

/// Coarse failure class of a run, for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "site_error")]
pub enum RunFailureKind {
    /// Input rejected before a browser was started.
    Validation,
    /// Page navigation kept failing after retries.
    Navigation,
    /// No selector strategy found a required element.
    ElementNotFound,
    /// The site itself reported a problem with the details.
    SiteReported(SiteErrorKind),
    /// The result PDF could not be retrieved.
    Download,
    /// The browser session could not be started or broke down.
    Browser,
    /// A step exceeded its time budget.
    Timeout,
    /// Local I/O (output directory) failed.
    Io,
}

/// Outcome of one run. Always returned, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub ok: bool,
    pub pdf_path: Option<PathBuf>,
    pub filename: Option<String>,
    pub error: Option<String>,
    pub failure: Option<RunFailureKind>,
    pub error_png: Option<PathBuf>,
    pub error_pdf: Option<PathBuf>,
    pub trace_path: Option<PathBuf>,
}

impl RunResult {
    pub(crate) fn success(pdf_path: PathBuf, trace_path: Option<PathBuf>) -> Self {
        let filename = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            ok: true,
            pdf_path: Some(pdf_path),
            filename,
            error: None,
            failure: None,
            error_png: None,
            error_pdf: None,
            trace_path,
        }
    }

    pub(crate) fn failure(kind: RunFailureKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            pdf_path: None,
            filename: None,
            error: Some(message.into()),
            failure: Some(kind),
            error_png: None,
            error_pdf: None,
            trace_path: None,
        }
    }
}
