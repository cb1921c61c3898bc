//! Cascading extraction: named strategies tried in order until both fields
//! clear the confidence threshold.
//!
//! ```text
//!  ┌────────────┐  below threshold  ┌──────────┐
//!  │ text-layer │ ────────────────▶ │  vision  │ ──▶ merge ──▶ ExtractionResult
//!  └────────────┘                   └──────────┘
//!   cheap, deterministic             paid, at most one call
//! ```
//!
//! Each strategy is asked only for the fields still pending. A plain
//! strategy's candidate replaces the current one when it scores higher. An
//! *escalation* strategy (vision) overrides pending fields outright, with its
//! confidence floored and its reason tagged onto the previous one
//! (`no_match+ai`). Adding a third strategy, say a local OCR engine, is one
//! more entry in the list.

use crate::config::ExtractionConfig;
use crate::error::RtwError;
use crate::fields::{DateOfBirth, ShareCode};
use crate::output::{ExtractionCandidate, ExtractionResult, FieldConfidence, Source};
use crate::pipeline::document::{DocumentInput, DocumentKind};
use crate::pipeline::encode::encode_png;
use crate::pipeline::matchers::{match_date_of_birth, match_share_code};
use crate::pipeline::normalize::NormalizedText;
use crate::pipeline::render::render_first_page;
use crate::pipeline::vision::{ImageGroup, ImageRole, VisionClient, VisionImage};
use async_trait::async_trait;
use futures::future::join;
use tracing::{debug, info, warn};

/// The two documents of one request.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub share_document: DocumentInput,
    pub dob_document: DocumentInput,
}

/// Which fields a strategy is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wanted {
    pub share_code: bool,
    pub date_of_birth: bool,
}

impl Wanted {
    pub fn any(self) -> bool {
        self.share_code || self.date_of_birth
    }
}

/// A candidate, or the reason tag for why there is none.
pub type Attempt<T> = Result<ExtractionCandidate<T>, String>;

/// What one strategy produced. `None` means the field was not attempted.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutcome {
    pub share_code: Option<Attempt<ShareCode>>,
    pub date_of_birth: Option<Attempt<DateOfBirth>>,
    pub text_layer_used: bool,
    pub ai_used: bool,
    pub notes: Vec<String>,
}

/// How an escalation strategy overrides earlier results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escalation {
    /// Appended to the previous reason: `<previous>+<tag>`.
    pub tag: &'static str,
    /// Overriding candidates score at least this much.
    pub confidence_floor: f32,
}

/// One way of reading the fields.
#[async_trait]
pub trait FieldStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `Some` for strategies whose answers override rather than compete.
    fn escalation(&self) -> Option<Escalation> {
        None
    }

    /// Try to read the `wanted` fields.
    ///
    /// `Err` is reserved for fatal problems; a strategy that simply finds
    /// nothing reports misses in the outcome.
    async fn attempt(&self, input: &ExtractionInput, wanted: Wanted) -> Result<StrategyOutcome, RtwError>;
}

// ── Text layer ───────────────────────────────────────────────────────────

/// Regex matching over the documents' text layers.
pub struct TextLayerStrategy {
    text_pages: usize,
    reference_year: i32,
}

impl TextLayerStrategy {
    pub fn new(text_pages: usize, reference_year: i32) -> Self {
        Self {
            text_pages,
            reference_year,
        }
    }
}

#[async_trait]
impl FieldStrategy for TextLayerStrategy {
    fn name(&self) -> &str {
        "text-layer"
    }

    async fn attempt(&self, input: &ExtractionInput, wanted: Wanted) -> Result<StrategyOutcome, RtwError> {
        let pages = self.text_pages;
        let share_text = async {
            if wanted.share_code {
                input.share_document.text_layer(pages).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let dob_text = async {
            if wanted.date_of_birth {
                input.dob_document.text_layer(pages).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (share_text, dob_text) = join(share_text, dob_text).await;
        let mut notes = Vec::new();
        let share_text = readable(share_text, "share code document", &mut notes);
        let dob_text = readable(dob_text, "DOB document", &mut notes);

        let text_layer_used = [&share_text, &dob_text]
            .iter()
            .any(|t| t.as_deref().is_some_and(|s| !s.trim().is_empty()));

        let share_code = share_text.map(|raw| {
            match_share_code(&NormalizedText::new(&raw)).map_err(|m| m.reason().to_string())
        });
        let date_of_birth = dob_text.map(|raw| {
            match_date_of_birth(&NormalizedText::new(&raw), self.reference_year)
                .map_err(|m| m.reason().to_string())
        });

        Ok(StrategyOutcome {
            share_code,
            date_of_birth,
            text_layer_used,
            ai_used: false,
            notes,
        })
    }
}

/// A text layer that could not be read counts as empty text.
fn readable(text: Result<Option<String>, RtwError>, label: &str, notes: &mut Vec<String>) -> Option<String> {
    match text {
        Ok(text) => text,
        Err(e) => {
            warn!("No text layer for {}: {}", label, e);
            notes.push(format!("no text layer for {label}: {e}"));
            Some(String::new())
        }
    }
}

// ── Vision ───────────────────────────────────────────────────────────────

/// Confidence given to, and floor applied to, vision answers.
pub const VISION_CONFIDENCE: f32 = 0.90;

/// One two-tier vision call over rendered pages and raw images.
pub struct VisionStrategy {
    client: VisionClient,
    dpi: u32,
    max_pixels: u32,
}

impl VisionStrategy {
    pub fn new(client: VisionClient, dpi: u32, max_pixels: u32) -> Self {
        Self {
            client,
            dpi,
            max_pixels,
        }
    }

    /// Images for one document; failures become notes.
    async fn images_for(&self, doc: &DocumentInput, label: &str, notes: &mut Vec<String>) -> Vec<VisionImage> {
        match doc.kind() {
            DocumentKind::Pdf => {
                match render_first_page(doc.shared_bytes(), self.dpi, self.max_pixels).await {
                    Ok(pages) => pages
                        .iter()
                        .filter_map(|img| match encode_png(img) {
                            Ok(png) => Some(VisionImage::new(png, "image/png")),
                            Err(e) => {
                                warn!("{}: {}", label, e);
                                None
                            }
                        })
                        .collect(),
                    Err(e) => {
                        warn!("Could not render {}: {}", label, e);
                        notes.push(format!("could not render {label}: {e}"));
                        Vec::new()
                    }
                }
            }
            DocumentKind::Image { mime } => vec![VisionImage::new(doc.shared_bytes(), mime)],
            DocumentKind::Text | DocumentKind::Empty => Vec::new(),
        }
    }
}

fn pending_names(wanted: Wanted) -> String {
    let mut names = Vec::new();
    if wanted.share_code {
        names.push("share_code");
    }
    if wanted.date_of_birth {
        names.push("dob");
    }
    names.join(", ")
}

#[async_trait]
impl FieldStrategy for VisionStrategy {
    fn name(&self) -> &str {
        "vision"
    }

    fn escalation(&self) -> Option<Escalation> {
        Some(Escalation {
            tag: "ai",
            confidence_floor: VISION_CONFIDENCE,
        })
    }

    async fn attempt(&self, input: &ExtractionInput, wanted: Wanted) -> Result<StrategyOutcome, RtwError> {
        let mut outcome = StrategyOutcome::default();

        if let Some(reason) = self.client.inert_reason() {
            info!("Vision fallback unavailable: {}", reason);
            outcome
                .notes
                .push(format!("vision fallback unavailable: {reason}"));
            return Ok(outcome);
        }

        outcome
            .notes
            .push(format!("vision fallback for {}", pending_names(wanted)));

        // Both documents go into the one call; only pending fields are read
        // back from the answer.
        let share_images = self
            .images_for(&input.share_document, "share code document", &mut outcome.notes)
            .await;
        let dob_images = self
            .images_for(&input.dob_document, "DOB document", &mut outcome.notes)
            .await;
        let groups: Vec<ImageGroup> = [
            (ImageRole::ShareCode, share_images),
            (ImageRole::DateOfBirth, dob_images),
        ]
        .into_iter()
        .filter(|(_, images)| !images.is_empty())
        .map(|(role, images)| ImageGroup { role, images })
        .collect();

        let mut needed = Vec::with_capacity(2);
        if wanted.share_code {
            needed.push(ImageRole::ShareCode);
        }
        if wanted.date_of_birth {
            needed.push(ImageRole::DateOfBirth);
        }

        match self.client.extract_for(&groups, &needed).await {
            Ok(vision) => {
                outcome.ai_used = !vision.models.is_empty();
                outcome.notes.extend(vision.notes);
                if wanted.share_code {
                    outcome.share_code = Some(
                        vision
                            .answer
                            .share_code
                            .map(|v| ExtractionCandidate::new(v, VISION_CONFIDENCE, "ai", Source::Vision))
                            .ok_or_else(|| "ai_no_answer".to_string()),
                    );
                }
                if wanted.date_of_birth {
                    outcome.date_of_birth = Some(
                        vision
                            .answer
                            .date_of_birth
                            .map(|v| ExtractionCandidate::new(v, VISION_CONFIDENCE, "ai", Source::Vision))
                            .ok_or_else(|| "ai_no_answer".to_string()),
                    );
                }
            }
            Err(e) => {
                warn!("Vision fallback failed: {}", e);
                outcome.notes.push(format!("vision fallback failed: {e}"));
            }
        }

        Ok(outcome)
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Current best for one field.
#[derive(Debug)]
struct FieldSlot<T> {
    candidate: Option<ExtractionCandidate<T>>,
    reason: String,
}

impl<T> FieldSlot<T> {
    fn new() -> Self {
        Self {
            candidate: None,
            reason: "not_attempted".to_string(),
        }
    }

    fn accepted(&self, threshold: f32) -> bool {
        self.candidate
            .as_ref()
            .is_some_and(|c| c.confidence >= threshold)
    }

    fn apply(&mut self, attempt: Option<Attempt<T>>, escalation: Option<Escalation>) {
        let Some(attempt) = attempt else { return };
        match (attempt, escalation) {
            (Ok(found), None) => {
                let better = self
                    .candidate
                    .as_ref()
                    .map_or(true, |c| found.confidence > c.confidence);
                if better {
                    self.reason = found.reason.clone();
                    self.candidate = Some(found);
                }
            }
            (Ok(found), Some(esc)) => {
                let previous = self.candidate.as_ref().map_or(0.0, |c| c.confidence);
                let reason = format!("{}+{}", self.reason, esc.tag);
                self.candidate = Some(ExtractionCandidate::new(
                    found.value,
                    found.confidence.max(previous).max(esc.confidence_floor),
                    reason.clone(),
                    found.source,
                ));
                self.reason = reason;
            }
            (Err(miss), None) => {
                if self.candidate.is_none() {
                    self.reason = miss;
                }
            }
            (Err(_), Some(_)) => {}
        }
    }
}

/// Runs strategies in order against a confidence threshold.
pub struct Extractor {
    strategies: Vec<Box<dyn FieldStrategy>>,
    threshold: f32,
}

impl Extractor {
    pub fn new(threshold: f32) -> Self {
        Self {
            strategies: Vec::new(),
            threshold,
        }
    }

    /// Text layer first, then one vision call if needed.
    pub fn standard(config: &ExtractionConfig, vision: VisionClient) -> Self {
        Self::new(config.confidence_threshold)
            .with_strategy(TextLayerStrategy::new(config.text_pages, config.reference_year))
            .with_strategy(VisionStrategy::new(
                vision,
                config.dpi,
                config.max_rendered_pixels,
            ))
    }

    pub fn with_strategy(mut self, strategy: impl FieldStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the cascade and merge the result.
    pub async fn run(&self, input: &ExtractionInput) -> Result<ExtractionResult, RtwError> {
        let mut share: FieldSlot<ShareCode> = FieldSlot::new();
        let mut dob: FieldSlot<DateOfBirth> = FieldSlot::new();
        let mut text_layer_used = false;
        let mut ai_used = false;
        let mut notes: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            let wanted = Wanted {
                share_code: !share.accepted(self.threshold),
                date_of_birth: !dob.accepted(self.threshold),
            };
            if !wanted.any() {
                break;
            }
            debug!("Strategy '{}' wanted: {}", strategy.name(), pending_names(wanted));

            let outcome = strategy.attempt(input, wanted).await?;
            text_layer_used |= outcome.text_layer_used;
            ai_used |= outcome.ai_used;
            notes.extend(outcome.notes);

            let escalation = strategy.escalation();
            if wanted.share_code {
                share.apply(outcome.share_code, escalation);
            }
            if wanted.date_of_birth {
                dob.apply(outcome.date_of_birth, escalation);
            }
        }

        let result = assemble(share, dob, text_layer_used, ai_used, notes);
        info!(
            share_confidence = result.confidence.share_code,
            dob_confidence = result.confidence.dob,
            ai_used = result.ai_used,
            "Extraction finished"
        );
        Ok(result)
    }
}

fn assemble(
    share: FieldSlot<ShareCode>,
    dob: FieldSlot<DateOfBirth>,
    text_layer_used: bool,
    ai_used: bool,
    notes: Vec<String>,
) -> ExtractionResult {
    let mut result = ExtractionResult {
        ok: true,
        ai_used,
        ai_notes: notes.join("; "),
        confidence: FieldConfidence {
            share_reason: share.reason,
            dob_reason: dob.reason,
            text_layer_used,
            ..Default::default()
        },
        ..Default::default()
    };

    if let Some(c) = share.candidate {
        result.share_code_display = c.value.display();
        result.share_code_raw9 = c.value.as_str().to_string();
        result.confidence.share_code = c.confidence;
        result.confidence.share_source = Some(c.source);
    }
    if let Some(c) = dob.candidate {
        result.dob_day = c.value.day_str();
        result.dob_month = c.value.month_str();
        result.dob_year = c.value.year_str();
        result.confidence.dob = c.confidence;
        result.confidence.dob_source = Some(c.source);
    }
    result
}
