//! End-to-end extraction with scripted vision models.
//!
//! No PDFium and no network: documents are plain text or real PNG bytes,
//! and the vision tiers replay canned replies while recording what they
//! were sent.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use rtw_check::error::VisionError;
use rtw_check::pipeline::vision::{ImageGroup, ImageRole, VisionModel};
use rtw_check::{extract_fields, pdfium_available, DocumentInput, ExtractionConfig, Source};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Replays replies in order and records the groups of every call.
struct Scripted {
    name: &'static str,
    replies: Mutex<VecDeque<Result<String, VisionError>>>,
    calls: Mutex<Vec<Vec<(ImageRole, Vec<String>)>>>,
}

impl Scripted {
    fn new(name: &'static str, replies: Vec<Result<&str, VisionError>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn roles_of_call(&self, n: usize) -> Vec<ImageRole> {
        self.calls.lock().unwrap()[n].iter().map(|(r, _)| *r).collect()
    }
}

#[async_trait]
impl VisionModel for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _prompt: &str, groups: &[ImageGroup]) -> Result<String, VisionError> {
        self.calls.lock().unwrap().push(
            groups
                .iter()
                .map(|g| (g.role, g.images.iter().map(|i| i.mime.clone()).collect()))
                .collect(),
        );
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("{}".to_string()))
    }
}

fn config_with(models: &[&Arc<Scripted>]) -> ExtractionConfig {
    ExtractionConfig::builder()
        .reference_year(2025)
        .vision_models(
            models
                .iter()
                .map(|m| Arc::clone(m) as Arc<dyn VisionModel>)
                .collect(),
        )
        .build()
        .unwrap()
}

fn png(name: &str) -> DocumentInput {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(16, 16))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    DocumentInput::new(buf, name)
}

fn text(body: &str, name: &str) -> DocumentInput {
    DocumentInput::new(body.as_bytes().to_vec(), name)
}

#[tokio::test]
async fn confident_text_layer_skips_vision() {
    let fast = Scripted::new("fast", vec![]);
    let config = config_with(&[&fast]);

    let r = extract_fields(
        text("Your share code is W7X 4PK 9QR", "share.txt"),
        text("DATE OF BIRTH: 13 AUG 92", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(fast.call_count(), 0);
    assert_eq!(r.share_code_display, "W7X 4PK 9QR");
    assert_eq!(r.confidence.share_reason, "near_share_code_label");
    assert_eq!((r.dob_day.as_str(), r.dob_month.as_str(), r.dob_year.as_str()), ("13", "08", "1992"));
    assert!(r.confidence.dob >= 0.85);
    assert_eq!(r.confidence.share_source, Some(Source::TextLayer));
    assert!(r.confidence.text_layer_used);
    assert!(!r.ai_used);
}

#[tokio::test]
async fn image_documents_escalate_once_with_both_groups() {
    let fast = Scripted::new(
        "fast",
        vec![Ok(r#"```json
{"share_code_raw9": "w7x4pk9qr", "dob": "13/08/1992"}
```"#)],
    );
    let strong = Scripted::new("strong", vec![]);
    let config = config_with(&[&fast, &strong]);

    let r = extract_fields(png("share.png"), png("passport.png"), &config)
        .await
        .unwrap();

    assert!(r.ok);
    assert_eq!(fast.call_count(), 1);
    assert_eq!(strong.call_count(), 0);
    assert_eq!(
        fast.roles_of_call(0),
        vec![ImageRole::ShareCode, ImageRole::DateOfBirth]
    );
    assert_eq!(fast.calls.lock().unwrap()[0][0].1, vec!["image/png".to_string()]);

    assert_eq!(r.share_code_raw9, "W7X4PK9QR");
    assert_eq!(r.dob_year, "1992");
    assert!(r.confidence.share_code >= 0.90);
    assert!(r.confidence.dob >= 0.90);
    assert_eq!(r.confidence.share_reason, "no_sharecode_match+ai");
    assert_eq!(r.confidence.dob_reason, "no_match+ai");
    assert_eq!(r.confidence.dob_source, Some(Source::Vision));
    assert!(!r.confidence.text_layer_used);
    assert!(r.ai_used);
    assert!(r.ai_notes.contains("model=fast"), "notes: {}", r.ai_notes);
}

#[tokio::test]
async fn incomplete_fast_answer_escalates_to_strong() {
    let fast = Scripted::new("fast", vec![Ok(r#"{"share_code_raw9": "W7X4PK9QR", "dob": ""}"#)]);
    let strong = Scripted::new(
        "strong",
        vec![Ok(r#"Here you go: {"share_code_raw9": "", "dob": "1992-08-13"} hope that helps"#)],
    );
    let config = config_with(&[&fast, &strong]);

    let r = extract_fields(png("share.jpg"), png("dob.png"), &config)
        .await
        .unwrap();

    assert_eq!(fast.call_count(), 1);
    assert_eq!(strong.call_count(), 1);
    assert_eq!(r.share_code_raw9, "W7X4PK9QR");
    assert_eq!((r.dob_day.as_str(), r.dob_month.as_str()), ("13", "08"));
    assert!(r.ai_notes.contains("model=fast (incomplete)"), "notes: {}", r.ai_notes);
    assert!(r.ai_notes.contains("model=strong"), "notes: {}", r.ai_notes);
}

#[tokio::test]
async fn only_the_missing_field_is_sent_to_vision() {
    // The labelled date is accepted from the text layer; the vision answer
    // for it is ignored.
    let fast = Scripted::new(
        "fast",
        vec![Ok(r#"{"share_code_raw9": "ABC123XYZ", "dob": "01/01/1970"}"#)],
    );
    let config = config_with(&[&fast]);

    let r = extract_fields(
        png("share.png"),
        text("Date of birth\n13 AUG 1992", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(fast.call_count(), 1);
    assert_eq!(fast.roles_of_call(0), vec![ImageRole::ShareCode]);
    assert_eq!(r.share_code_raw9, "ABC123XYZ");
    assert_eq!(r.confidence.share_reason, "no_sharecode_match+ai");
    assert_eq!(r.confidence.share_code, 0.90);
    assert_eq!(r.dob_year, "1992");
    assert_eq!(r.confidence.dob_source, Some(Source::TextLayer));
    assert!(r.confidence.text_layer_used);
}

#[tokio::test]
async fn answered_pending_field_does_not_escalate() {
    // Only the share code is pending; a fast answer without a date is still
    // complete for this request.
    let fast = Scripted::new("fast", vec![Ok(r#"{"share_code_raw9":"W7X4PK9QR","dob":""}"#)]);
    let strong = Scripted::new("strong", vec![Ok(r#"{"share_code_raw9":"","dob":""}"#)]);
    let config = config_with(&[&fast, &strong]);

    let r = extract_fields(
        png("share.png"),
        text("DATE OF BIRTH: 13 AUG 92", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(fast.call_count(), 1);
    assert_eq!(strong.call_count(), 0);
    assert_eq!(r.share_code_raw9, "W7X4PK9QR");
    assert_eq!(r.dob_year, "1992");
    assert!(r.ai_notes.contains("model=fast"), "notes: {}", r.ai_notes);
    assert!(!r.ai_notes.contains("incomplete"), "notes: {}", r.ai_notes);
    assert!(!r.ai_notes.contains("model=strong"), "notes: {}", r.ai_notes);
}

#[tokio::test]
async fn unreadable_pdf_is_an_empty_text_layer() {
    let config = ExtractionConfig::builder()
        .vision_enabled(false)
        .build()
        .unwrap();

    let r = extract_fields(
        DocumentInput::new(b"%PDF-1.7\n%truncated".to_vec(), "share.pdf"),
        text("DOB: 03/06/1978", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    assert!(r.ok);
    assert_eq!(r.share_code_raw9, "");
    assert_eq!(r.confidence.share_reason, "no_sharecode_match");
    assert_eq!(r.dob_year, "1978");
    if !pdfium_available() {
        assert!(
            r.ai_notes.contains("no text layer for share code document"),
            "notes: {}",
            r.ai_notes
        );
    }
}

#[tokio::test]
async fn failing_vision_never_fails_extraction() {
    let err = || VisionError::Api {
        model: "m".into(),
        message: "503 Service Unavailable".into(),
    };
    let fast = Scripted::new("fast", vec![Err(err())]);
    let strong = Scripted::new("strong", vec![Err(err())]);
    let config = config_with(&[&fast, &strong]);

    let r = extract_fields(
        png("share.png"),
        text("DOB 03/06/1978", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    assert!(r.ok);
    assert!(!r.ai_used);
    assert_eq!(r.share_code_raw9, "");
    assert_eq!(r.confidence.share_code, 0.0);
    assert_eq!(r.confidence.share_reason, "no_sharecode_match");
    // The date stays as the text layer found it.
    assert_eq!(r.dob_year, "1978");
    assert!(r.ai_notes.contains("vision fallback failed"), "notes: {}", r.ai_notes);
    assert!(r.ai_notes.contains("503"), "notes: {}", r.ai_notes);
}

#[tokio::test]
async fn unparseable_replies_leave_fields_empty() {
    let fast = Scripted::new("fast", vec![Ok("I can't read this document.")]);
    let strong = Scripted::new("strong", vec![Ok("Sorry.")]);
    let config = config_with(&[&fast, &strong]);

    let r = extract_fields(png("a.png"), png("b.png"), &config)
        .await
        .unwrap();

    assert_eq!(strong.call_count(), 1);
    assert!(r.ok);
    assert_eq!(r.share_code_display, "");
    assert_eq!(r.dob_day, "");
    assert_eq!(r.confidence.dob, 0.0);
    assert_eq!(r.confidence.dob_reason, "no_match");
}

#[tokio::test]
async fn missing_key_makes_vision_a_noted_no_op() {
    let config = ExtractionConfig::builder()
        .api_key_env("RTW_TEST_KEY_THAT_IS_NEVER_SET")
        .build()
        .unwrap();

    let r = extract_fields(png("a.png"), png("b.png"), &config)
        .await
        .unwrap();

    assert!(r.ok);
    assert!(!r.ai_used);
    assert_eq!(r.confidence.share_code, 0.0);
    assert!(
        r.ai_notes.contains("RTW_TEST_KEY_THAT_IS_NEVER_SET is not set"),
        "notes: {}",
        r.ai_notes
    );
}

#[tokio::test]
async fn out_of_range_year_is_discarded() {
    let config = ExtractionConfig::builder()
        .vision_enabled(false)
        .build()
        .unwrap();

    let r = extract_fields(
        text("SHARE CODE: W7X 4PK 9QR", "share.txt"),
        text("Date of birth 01.01.1850", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(r.dob_day, "");
    assert_eq!(r.confidence.dob_reason, "year_out_of_range");
    assert_eq!(r.share_code_raw9, "W7X4PK9QR");
}

#[tokio::test]
async fn json_shape_of_result() {
    let config = ExtractionConfig::builder()
        .vision_enabled(false)
        .build()
        .unwrap();
    let r = extract_fields(
        text("SHARE CODE: W7X 4PK 9QR", "share.txt"),
        text("DOB: 03/06/1978", "dob.txt"),
        &config,
    )
    .await
    .unwrap();

    let v = serde_json::to_value(&r).unwrap();
    assert_eq!(v["ok"], true);
    assert_eq!(v["share_code_raw9"], "W7X4PK9QR");
    assert_eq!(v["dob_month"], "06");
    assert_eq!(v["confidence"]["share_source"], "text-layer");
    assert_eq!(v["ai_used"], false);
}
