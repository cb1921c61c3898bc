//! End-to-end tests against real PDFium, a live vision model and a live
//! WebDriver endpoint.
//!
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested. Documents are supplied by
//! path, since real share-code letters and passports cannot be checked in:
//!
//!   E2E_ENABLED=1 RTW_E2E_SHARE_DOC=letter.pdf RTW_E2E_DOB_DOC=passport.jpg \
//!     cargo test --test e2e -- --nocapture
//!
//! The online check additionally needs `RTW_E2E_RUN=1`, a running
//! chromedriver (`RTW_WEBDRIVER_URL`) and real details in
//! `RTW_E2E_SHARE_CODE`, `RTW_E2E_DOB` (`DD/MM/YYYY`) and
//! `RTW_E2E_COMPANY`.

use rtw_check::pipeline::render::render_first_page;
use rtw_check::{
    extract_files, pdfium_available, run_check, DocumentInput, ExtractionConfig, RunConfig,
    RunRequest, WebDriverLauncher,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────

/// Skip unless E2E_ENABLED is set and the file named by `$var` exists.
macro_rules! e2e_skip_unless_ready {
    ($var:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let Some(p) = std::env::var_os($var).map(PathBuf::from) else {
            println!("SKIP — {} is not set", $var);
            return;
        };
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn is_pdf(path: &std::path::Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

// ── PDFium ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdfium_renders_first_page_bands() {
    let path = e2e_skip_unless_ready!("RTW_E2E_SHARE_DOC");
    if !is_pdf(&path) || !pdfium_available() {
        println!("SKIP — needs a PDF and a loadable PDFium library");
        return;
    }

    let bytes: Arc<[u8]> = std::fs::read(&path).unwrap().into();
    let images = render_first_page(bytes, 150, 4000).await.unwrap();

    assert_eq!(images.len(), 4, "three bands plus the full page");
    let full = images.last().unwrap();
    assert!(full.width() > 0 && full.height() > 0);
    assert!(full.width().max(full.height()) <= 4000);
    for band in &images[..3] {
        assert_eq!(band.width(), full.width());
        assert!(band.height() < full.height());
    }
}

#[tokio::test]
async fn test_text_layer_only() {
    let path = e2e_skip_unless_ready!("RTW_E2E_SHARE_DOC");
    if !is_pdf(&path) {
        println!("SKIP — share document is not a PDF");
        return;
    }

    let doc = DocumentInput::from_path(&path).await.unwrap();
    let text = doc.text_layer(2).await.unwrap();
    println!("text layer: {} chars", text.chars().count());

    let config = ExtractionConfig::builder()
        .vision_enabled(false)
        .build()
        .unwrap();
    let result = extract_files(&path, &path, &config).await.unwrap();
    println!("{}", serde_json::to_string_pretty(&result).unwrap());

    assert!(result.ok);
    assert!(!result.ai_used);
    assert!(result.ai_notes.contains("disabled by configuration"));
    if result.confidence.text_layer_used && !result.share_code_raw9.is_empty() {
        assert_eq!(result.share_code_raw9.len(), 9);
    }
}

// ── Vision ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_cascade_with_live_model() {
    let share = e2e_skip_unless_ready!("RTW_E2E_SHARE_DOC");
    let dob = e2e_skip_unless_ready!("RTW_E2E_DOB_DOC");
    if std::env::var("GEMINI_API_KEY").is_err() {
        println!("SKIP — GEMINI_API_KEY is not set");
        return;
    }

    let config = ExtractionConfig::from_env().unwrap();
    let result = extract_files(&share, &dob, &config).await.unwrap();
    println!("{}", serde_json::to_string_pretty(&result).unwrap());

    assert!(result.ok);
    assert!(
        result.is_complete(config.confidence_threshold),
        "both fields expected; notes: {}",
        result.ai_notes
    );
    if result.ai_used {
        assert!(result.ai_notes.contains("model="), "notes: {}", result.ai_notes);
    }
}

// ── Online check ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_online_check() {
    if std::env::var("E2E_ENABLED").is_err() || std::env::var("RTW_E2E_RUN").is_err() {
        println!("SKIP — set E2E_ENABLED=1 and RTW_E2E_RUN=1 to drive the live service");
        return;
    }
    let var = |k: &str| std::env::var(k).unwrap_or_default();
    let dob = var("RTW_E2E_DOB");
    let mut parts = dob.split('/');
    let out = tempfile::tempdir().unwrap();

    let request = RunRequest {
        share_code: var("RTW_E2E_SHARE_CODE"),
        dob_day: parts.next().unwrap_or("").to_string(),
        dob_month: parts.next().unwrap_or("").to_string(),
        dob_year: parts.next().unwrap_or("").to_string(),
        company_name: var("RTW_E2E_COMPANY"),
        out_dir: out.path().to_path_buf(),
    };
    let config = RunConfig::from_env().unwrap();

    let result = run_check(&WebDriverLauncher::default(), &request, &config).await;
    println!("{}", serde_json::to_string_pretty(&result).unwrap());

    assert!(result.ok, "run failed: {:?}", result.error);
    let pdf = std::fs::read(result.pdf_path.unwrap()).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}
