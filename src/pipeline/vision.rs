//! Vision fallback: ask a multimodal model to read both fields off images.
//!
//! The module is intentionally thin. Prompt text lives in
//! [`crate::prompts`]; the orchestrator decides *when* to call; this module
//! only knows *how*:
//!
//! 1. Send the images, grouped by document, behind a fixed prompt.
//! 2. Parse the reply permissively (Markdown fences, chatter around the
//!    JSON). A reply that cannot be parsed is an empty answer, not an error.
//! 3. Escalate once: when the fast tier's answer is incomplete, ask the
//!    strong tier and merge field by field, preferring the strong answer.
//!
//! ## Inert client
//!
//! Without an API key (or with the fallback disabled) the client is inert.
//! Extraction then reports text-layer results only; this is a normal outcome.

use crate::config::ExtractionConfig;
use crate::error::VisionError;
use crate::fields::{expand_two_digit_year, DateOfBirth, ShareCode};
use crate::pipeline::encode::image_data;
use crate::pipeline::matchers::month_from_name;
use crate::prompts::{
    DOB_GROUP_LABEL, DOB_KEY, SHARE_CODE_GROUP_LABEL, SHARE_CODE_KEY, VISION_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ── Request types ────────────────────────────────────────────────────────

/// Which document a group of images came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    ShareCode,
    DateOfBirth,
}

impl ImageRole {
    pub const ALL: [ImageRole; 2] = [ImageRole::ShareCode, ImageRole::DateOfBirth];

    /// Text placed before the group's images in the request.
    pub fn label(self) -> &'static str {
        match self {
            ImageRole::ShareCode => SHARE_CODE_GROUP_LABEL,
            ImageRole::DateOfBirth => DOB_GROUP_LABEL,
        }
    }
}

/// One image with its MIME type.
#[derive(Debug, Clone)]
pub struct VisionImage {
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

impl VisionImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }
}

/// Images of one document, in the order they should be shown.
#[derive(Debug, Clone)]
pub struct ImageGroup {
    pub role: ImageRole,
    pub images: Vec<VisionImage>,
}

// ── Model seam ───────────────────────────────────────────────────────────

/// A multimodal model that turns a prompt plus grouped images into text.
///
/// The production implementation is [`LlmVisionModel`]; tests script their
/// own.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model identifier, reported in notes.
    fn name(&self) -> &str;

    /// One request, one raw text reply.
    async fn generate(&self, prompt: &str, groups: &[ImageGroup]) -> Result<String, VisionError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmVisionModel {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    fn name(&self) -> &str {
        &self.model
    }

    /// ## Message Layout
    ///
    /// 1. **System message**: the extraction prompt
    /// 2. **One user message per non-empty group**: the group label as text,
    ///    the group's images as attachments
    async fn generate(&self, prompt: &str, groups: &[ImageGroup]) -> Result<String, VisionError> {
        let mut messages = vec![ChatMessage::system(prompt)];
        for group in groups.iter().filter(|g| !g.images.is_empty()) {
            let images = group
                .images
                .iter()
                .map(|img| image_data(&img.bytes, &img.mime))
                .collect();
            messages.push(ChatMessage::user_with_images(group.role.label(), images));
        }

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| VisionError::Api {
                model: self.model.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

// ── Answers ──────────────────────────────────────────────────────────────

/// Validated fields read by one or more model tiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionAnswer {
    pub share_code: Option<ShareCode>,
    pub date_of_birth: Option<DateOfBirth>,
}

impl VisionAnswer {
    /// Validate a parsed JSON reply. Invalid values become `None`.
    pub fn from_json(obj: &Map<String, Value>, reference_year: i32) -> Self {
        let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or("");
        Self {
            share_code: ShareCode::parse(text(SHARE_CODE_KEY)),
            date_of_birth: parse_lenient_date(text(DOB_KEY), reference_year),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.share_code.is_some() && self.date_of_birth.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.share_code.is_none() && self.date_of_birth.is_none()
    }

    /// Whether every field in `roles` has a value.
    pub fn covers(&self, roles: &[ImageRole]) -> bool {
        roles.iter().all(|role| match role {
            ImageRole::ShareCode => self.share_code.is_some(),
            ImageRole::DateOfBirth => self.date_of_birth.is_some(),
        })
    }

    /// Field-wise merge where `stronger` wins whenever it has a value.
    pub fn merged_with(self, stronger: VisionAnswer) -> VisionAnswer {
        VisionAnswer {
            share_code: stronger.share_code.or(self.share_code),
            date_of_birth: stronger.date_of_birth.or(self.date_of_birth),
        }
    }
}

/// What a vision call produced, with human-readable notes.
#[derive(Debug, Clone, Default)]
pub struct VisionOutcome {
    pub answer: VisionAnswer,
    /// Model ids that replied, in call order.
    pub models: Vec<String>,
    /// One entry per tier: what it returned or why it failed.
    pub notes: Vec<String>,
}

// ── Client ───────────────────────────────────────────────────────────────

/// Two-tier vision client (fast, then strong), or an inert stand-in.
pub struct VisionClient {
    tiers: Vec<Arc<dyn VisionModel>>,
    timeout: Duration,
    reference_year: i32,
    inert_reason: Option<String>,
}

impl VisionClient {
    /// Build the client described by `config`.
    ///
    /// Never fails: a missing key, a disabled fallback or a provider that
    /// cannot be constructed all give an inert client carrying the reason.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let v = &config.vision;
        let timeout = v.timeout();
        let year = config.reference_year;

        if !v.enabled {
            return Self::inert("disabled by configuration");
        }
        if let Some(ref models) = v.models {
            if models.is_empty() {
                return Self::inert("no vision models configured");
            }
            return Self::with_models(models.clone(), timeout, year);
        }

        let key_present = std::env::var(&v.api_key_env)
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);
        if !key_present {
            return Self::inert(format!("{} is not set", v.api_key_env));
        }

        let mut ids = vec![v.fast_model.clone()];
        if v.strong_model != v.fast_model {
            ids.push(v.strong_model.clone());
        }

        let mut tiers: Vec<Arc<dyn VisionModel>> = Vec::with_capacity(ids.len());
        let mut failures = Vec::new();
        for id in ids {
            match ProviderFactory::create_llm_provider(&v.provider_name, &id) {
                Ok(provider) => tiers.push(Arc::new(LlmVisionModel::new(
                    provider,
                    id,
                    v.temperature,
                    v.max_tokens,
                ))),
                Err(e) => {
                    warn!("Vision provider '{}' ({}) unavailable: {}", v.provider_name, id, e);
                    failures.push(format!("{id}: {e}"));
                }
            }
        }

        if tiers.is_empty() {
            return Self::inert(format!(
                "provider '{}' could not be created ({})",
                v.provider_name,
                failures.join("; ")
            ));
        }
        Self::with_models(tiers, timeout, year)
    }

    /// Use these tiers, fastest first. Only the first two are ever called.
    pub fn with_models(models: Vec<Arc<dyn VisionModel>>, timeout: Duration, reference_year: i32) -> Self {
        let mut tiers: Vec<Arc<dyn VisionModel>> = Vec::with_capacity(2);
        for model in models.into_iter().take(2) {
            if tiers.iter().all(|t| t.name() != model.name()) {
                tiers.push(model);
            }
        }
        Self {
            tiers,
            timeout,
            reference_year,
            inert_reason: None,
        }
    }

    /// A client that never calls anything.
    pub fn inert(reason: impl Into<String>) -> Self {
        Self {
            tiers: Vec::new(),
            timeout: Duration::from_secs(1),
            reference_year: 0,
            inert_reason: Some(reason.into()),
        }
    }

    /// Why the client is inert, if it is.
    pub fn inert_reason(&self) -> Option<&str> {
        self.inert_reason.as_deref()
    }

    pub fn is_inert(&self) -> bool {
        self.inert_reason.is_some() || self.tiers.is_empty()
    }

    /// Model ids in call order.
    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name().to_string()).collect()
    }

    /// Read both fields from `groups`.
    pub async fn extract(&self, groups: &[ImageGroup]) -> Result<VisionOutcome, VisionError> {
        self.extract_for(groups, &ImageRole::ALL).await
    }

    /// Read the fields named by `needed`, showing the model every group.
    ///
    /// The strong tier runs only while a needed field is still missing;
    /// values for other fields are kept but never trigger escalation.
    ///
    /// An inert client returns an empty outcome. Otherwise `Err` only when
    /// no needed field has images or every tier failed to reply; a reply
    /// that does not parse is an empty answer, and the next tier is tried.
    pub async fn extract_for(
        &self,
        groups: &[ImageGroup],
        needed: &[ImageRole],
    ) -> Result<VisionOutcome, VisionError> {
        if self.is_inert() {
            return Ok(VisionOutcome::default());
        }
        let has_images = |role: &ImageRole| {
            groups
                .iter()
                .any(|g| g.role == *role && !g.images.is_empty())
        };
        if !needed.iter().any(has_images) {
            return Err(VisionError::NoImages);
        }

        let mut outcome = VisionOutcome::default();
        let mut errors: Vec<String> = Vec::new();

        for (idx, tier) in self.tiers.iter().enumerate() {
            let name = tier.name().to_string();
            let start = Instant::now();
            info!("Vision tier {} ({}) called", idx + 1, name);

            let reply = match tokio::time::timeout(
                self.timeout,
                tier.generate(VISION_SYSTEM_PROMPT, groups),
            )
            .await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!("Vision tier {} failed: {}", name, e);
                    outcome.notes.push(format!("{name}: {e}"));
                    errors.push(e.to_string());
                    continue;
                }
                Err(_) => {
                    let e = VisionError::Timeout {
                        model: name.clone(),
                        secs: self.timeout.as_secs(),
                    };
                    warn!("{}", e);
                    outcome.notes.push(e.to_string());
                    errors.push(e.to_string());
                    continue;
                }
            };

            let answer = VisionAnswer::from_json(&parse_json_response(&reply), self.reference_year);
            debug!(
                "Vision tier {} answered in {:?}: share_code={} dob={}",
                name,
                start.elapsed(),
                answer.share_code.is_some(),
                answer.date_of_birth.is_some()
            );
            outcome.notes.push(if answer.covers(needed) {
                format!("model={name}")
            } else {
                format!("model={name} (incomplete)")
            });
            outcome.models.push(name);
            outcome.answer = std::mem::take(&mut outcome.answer).merged_with(answer);

            if outcome.answer.covers(needed) {
                break;
            }
        }

        if outcome.models.is_empty() {
            return Err(VisionError::AllTiersFailed(errors.join("; ")));
        }
        Ok(outcome)
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)^```[a-z]*\s*(.*?)\s*```$").unwrap());

/// Parse a model reply into a JSON object, permissively.
///
/// Strips Markdown code fences, then takes the first balanced `{…}` object
/// in the text. Anything unparseable yields an empty map.
pub fn parse_json_response(reply: &str) -> Map<String, Value> {
    let trimmed = reply.trim();
    let body = RE_FENCED
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let Some(object) = first_json_object(body) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(object) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Slice of the first balanced `{…}`, ignoring braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Lenient dates ────────────────────────────────────────────────────────

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b").unwrap());

static RE_NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[-/. ](\d{1,2})[-/. ](\d{2}|\d{4})\b").unwrap());

static RE_DAY_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})(?:ST|ND|RD|TH)?\s*[-/ ]?\s*(\p{Lu}{3,10})\.?\s*[-/ ,]?\s*(\d{2}|\d{4})\b").unwrap()
});

static RE_MONTH_NAME_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\p{Lu}{3,10})\.?\s+(\d{1,2})(?:ST|ND|RD|TH)?,?\s+(\d{2}|\d{4})\b").unwrap()
});

/// Parse a free-form date string from a model, day before month.
///
/// Accepts `13/08/1992`, `13-08-92`, `1992-08-13`, `13 Aug 1992`,
/// `13 AOÛT 92`, `August 13, 1992`. Two-digit years are expanded against
/// `reference_year`. Unlike the text-layer matchers, the result must be a
/// real calendar date: `31/02/1990` is rejected. A numeric date that is only
/// valid month-first (`08/13/1992`) is read that way.
pub fn parse_lenient_date(input: &str, reference_year: i32) -> Option<DateOfBirth> {
    let s = input.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    if let Some(c) = RE_ISO_DATE.captures(&s) {
        return calendar_date(num(&c[3])?, num(&c[2])?, num(&c[1])?, reference_year);
    }

    if let Some(c) = RE_NUMERIC_DATE.captures(&s) {
        let (a, b, y) = (num(&c[1])?, num(&c[2])?, num(&c[3])?);
        return calendar_date(a, b, y, reference_year)
            .or_else(|| calendar_date(b, a, y, reference_year));
    }

    if let Some(c) = RE_DAY_MONTH_NAME.captures(&s) {
        if let Some(month) = month_from_name(&c[2]) {
            return calendar_date(num(&c[1])?, month, num(&c[3])?, reference_year);
        }
    }

    if let Some(c) = RE_MONTH_NAME_DAY.captures(&s) {
        if let Some(month) = month_from_name(&c[1]) {
            return calendar_date(num(&c[2])?, month, num(&c[3])?, reference_year);
        }
    }

    None
}

fn num(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn calendar_date(day: u32, month: u32, year: u32, reference_year: i32) -> Option<DateOfBirth> {
    let year = expand_two_digit_year(year, reference_year);
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    DateOfBirth::new(day, month, year)
}
