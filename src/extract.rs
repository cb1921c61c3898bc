//! Extraction entry points.
//!
//! Two documents in, one [`ExtractionResult`] out. Expected failure modes
//! (no text layer, no match, vision unavailable or failing) come back as
//! empty, zero-confidence fields with a note; `Err` is reserved for
//! oversized uploads, a missing PDFium library and internal faults.

use crate::config::ExtractionConfig;
use crate::error::RtwError;
use crate::output::ExtractionResult;
use crate::pipeline::document::DocumentInput;
use crate::pipeline::strategy::{ExtractionInput, Extractor};
use crate::pipeline::vision::VisionClient;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Extract the share code and date of birth from two uploaded documents.
///
/// # Arguments
/// * `share_document` — the document carrying the share code
/// * `dob_document` — the document carrying the date of birth
/// * `config` — extraction configuration
///
/// The vision client is built from `config.vision`; pass a pre-built one
/// with [`extract_fields_with`].
pub async fn extract_fields(
    share_document: DocumentInput,
    dob_document: DocumentInput,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, RtwError> {
    let vision = VisionClient::from_config(config);
    extract_fields_with(share_document, dob_document, config, vision).await
}

/// Like [`extract_fields`], with an explicit vision client.
///
/// Build the client once and reuse it across requests; it holds no
/// per-request state.
pub async fn extract_fields_with(
    share_document: DocumentInput,
    dob_document: DocumentInput,
    config: &ExtractionConfig,
    vision: VisionClient,
) -> Result<ExtractionResult, RtwError> {
    share_document.check_size("Share code document", config.max_upload_bytes)?;
    dob_document.check_size("DOB document", config.max_upload_bytes)?;

    let start = Instant::now();
    info!(
        share = %share_document.filename(),
        dob = %dob_document.filename(),
        "Starting extraction"
    );

    let input = ExtractionInput {
        share_document,
        dob_document,
    };
    let result = Extractor::standard(config, vision).run(&input).await?;

    info!(
        "Extraction done in {}ms (share={:?}, dob={}/{}/{})",
        start.elapsed().as_millis(),
        result.share_code_display,
        result.dob_day,
        result.dob_month,
        result.dob_year
    );
    Ok(result)
}

/// Read both documents from disk and extract.
pub async fn extract_files(
    share_path: impl AsRef<Path>,
    dob_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, RtwError> {
    let share = DocumentInput::from_path(share_path).await?;
    let dob = DocumentInput::from_path(dob_path).await?;
    extract_fields(share, dob, config).await
}

/// Synchronous wrapper around [`extract_fields`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_fields_sync(
    share_document: DocumentInput,
    dob_document: DocumentInput,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, RtwError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RtwError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_fields(share_document, dob_document, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let config = ExtractionConfig::builder()
            .max_upload_bytes(4)
            .vision_enabled(false)
            .build()
            .unwrap();
        let share = DocumentInput::new(b"W7X 4PK 9QR".to_vec(), "share.txt");
        let dob = DocumentInput::new(b"x".to_vec(), "dob.txt");
        let err = extract_fields(share, dob, &config).await.unwrap_err();
        assert!(err.to_string().contains("Share code document"), "got: {err}");
    }

    #[tokio::test]
    async fn text_documents_need_no_vision() {
        let config = ExtractionConfig::builder()
            .vision_enabled(false)
            .reference_year(2025)
            .build()
            .unwrap();
        let share = DocumentInput::new(b"Your share code is: W7X 4PK 9QR".to_vec(), "share.txt");
        let dob = DocumentInput::new(b"DATE OF BIRTH: 13 AUG 92".to_vec(), "dob.txt");
        let r = extract_fields(share, dob, &config).await.unwrap();
        assert!(r.ok);
        assert_eq!(r.share_code_raw9, "W7X4PK9QR");
        assert_eq!((r.dob_day.as_str(), r.dob_month.as_str(), r.dob_year.as_str()), ("13", "08", "1992"));
        assert!(!r.ai_used);
        assert!(r.ai_notes.is_empty());
        assert!(r.is_complete(0.80));
    }

    #[test]
    fn sync_wrapper_runs() {
        let config = ExtractionConfig::builder().vision_enabled(false).build().unwrap();
        let r = extract_fields_sync(DocumentInput::empty(), DocumentInput::empty(), &config).unwrap();
        assert!(r.ok);
        assert_eq!(r.confidence.share_code, 0.0);
        assert!(r.ai_notes.contains("vision fallback unavailable"));
    }
}
