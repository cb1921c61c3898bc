//! Configuration types for extraction and for the online check.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`] (which
//! embeds a [`VisionConfig`]), and the form-filling run through
//! [`RunConfig`]. Both are built via builders so callers set only what they
//! care about and rely on documented defaults for the rest.
//!
//! # Design choice: builder over constructor
//! The run configuration alone has well over a dozen knobs (timeouts, settle
//! delays, browser identity). The builder clamps values into sane ranges as
//! they are set and `build()` rejects the combinations that cannot work.

use crate::error::RtwError;
use crate::pipeline::vision::VisionModel;
use crate::progress::RunProgressCallback;
use chrono::Datelike;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default confidence a text-layer field needs to skip the vision fallback.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.80;

/// Default per-document upload cap: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Public entry page of the Right to Work check.
pub const DEFAULT_START_URL: &str = "https://www.gov.uk/view-right-to-work";

/// Where `chromedriver` listens by default.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Desktop Chrome identity presented to the site.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

// ── Vision ───────────────────────────────────────────────────────────────

/// Settings for the two-tier vision fallback.
#[derive(Clone)]
pub struct VisionConfig {
    /// Provider name handed to `ProviderFactory`. Default: `"gemini"`.
    pub provider_name: String,

    /// Environment variable that must hold a non-empty API key for the
    /// fallback to be active. Default: `GEMINI_API_KEY`.
    ///
    /// When it is unset the vision client is inert: every call returns an
    /// empty answer and extraction reports text-layer results only.
    pub api_key_env: String,

    /// Cheap model tried first. Default: `gemini-2.0-flash-001`.
    pub fast_model: String,

    /// Stronger model tried once when the fast answer is incomplete.
    /// Default: `gemini-2.5-pro`.
    pub strong_model: String,

    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,

    /// Output token cap. The answer is a two-key JSON object. Default: 512.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub timeout_secs: u64,

    /// Master switch. Default: true.
    pub enabled: bool,

    /// Pre-built model tiers, fastest first. Takes precedence over
    /// provider construction and the API-key check.
    pub models: Option<Vec<Arc<dyn VisionModel>>>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider_name: "gemini".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            fast_model: "gemini-2.0-flash-001".to_string(),
            strong_model: "gemini-2.5-pro".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            timeout_secs: 60,
            enabled: true,
            models: None,
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("provider_name", &self.provider_name)
            .field("api_key_env", &self.api_key_env)
            .field("fast_model", &self.fast_model)
            .field("strong_model", &self.strong_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("enabled", &self.enabled)
            .field(
                "models",
                &self
                    .models
                    .as_ref()
                    .map(|m| m.iter().map(|x| x.name().to_string()).collect::<Vec<_>>()),
            )
            .finish()
    }
}

impl VisionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for one extraction request.
///
/// # Example
/// ```rust
/// use rtw_check::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .confidence_threshold(0.85)
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Minimum text-layer confidence that avoids the vision fallback.
    /// Range: 0.0–1.0. Default: 0.80.
    pub confidence_threshold: f32,

    /// DPI for rendering PDF pages before sending them to the model.
    /// Range: 72–400. Default: 240.
    ///
    /// Share codes are printed small; at 150 DPI the model confuses `0/O`
    /// and `1/I` noticeably more often.
    pub dpi: u32,

    /// Longest rendered edge in pixels, whatever the DPI. Default: 4096.
    pub max_rendered_pixels: u32,

    /// How many leading pages contribute to the text layer. Default: 2.
    pub text_pages: usize,

    /// Per-document size cap in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,

    /// Year used to expand two-digit years. Default: the current UTC year.
    pub reference_year: i32,

    /// Vision fallback settings.
    pub vision: VisionConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            dpi: 240,
            max_rendered_pixels: 4096,
            text_pages: 2,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            reference_year: chrono::Utc::now().year(),
            vision: VisionConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overridden by the environment.
    ///
    /// Reads `GEMINI_MODEL_FAST`, `GEMINI_MODEL_STRONG`,
    /// `RTW_VISION_PROVIDER`, `RTW_CONF_THRESHOLD` and `RTW_RENDER_DPI`.
    /// Unparseable numbers are ignored with a warning. The API key itself
    /// is read when the vision client is built, not here.
    pub fn from_env() -> Result<Self, RtwError> {
        let mut b = Self::builder();
        if let Some(model) = env_nonempty("GEMINI_MODEL_FAST") {
            b = b.fast_model(model);
        }
        if let Some(model) = env_nonempty("GEMINI_MODEL_STRONG") {
            b = b.strong_model(model);
        }
        if let Some(provider) = env_nonempty("RTW_VISION_PROVIDER") {
            b = b.vision_provider(provider);
        }
        if let Some(t) = env_parsed::<f32>("RTW_CONF_THRESHOLD") {
            b = b.confidence_threshold(t);
        }
        if let Some(dpi) = env_parsed::<u32>("RTW_RENDER_DPI") {
            b = b.dpi(dpi);
        }
        b.build()
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn confidence_threshold(mut self, t: f32) -> Self {
        self.config.confidence_threshold = t;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn text_pages(mut self, n: usize) -> Self {
        self.config.text_pages = n;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn reference_year(mut self, year: i32) -> Self {
        self.config.reference_year = year;
        self
    }

    pub fn vision(mut self, vision: VisionConfig) -> Self {
        self.config.vision = vision;
        self
    }

    pub fn vision_provider(mut self, name: impl Into<String>) -> Self {
        self.config.vision.provider_name = name.into();
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.config.vision.api_key_env = var.into();
        self
    }

    pub fn fast_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision.fast_model = model.into();
        self
    }

    pub fn strong_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision.strong_model = model.into();
        self
    }

    pub fn vision_temperature(mut self, t: f32) -> Self {
        self.config.vision.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_max_tokens(mut self, n: usize) -> Self {
        self.config.vision.max_tokens = n;
        self
    }

    pub fn vision_timeout_secs(mut self, secs: u64) -> Self {
        self.config.vision.timeout_secs = secs;
        self
    }

    pub fn vision_enabled(mut self, v: bool) -> Self {
        self.config.vision.enabled = v;
        self
    }

    /// Use these model tiers (fastest first) instead of building providers.
    pub fn vision_models(mut self, models: Vec<Arc<dyn VisionModel>>) -> Self {
        self.config.vision.models = Some(models);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, RtwError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(RtwError::InvalidConfig(format!(
                "confidence threshold must be 0.0–1.0, got {}",
                c.confidence_threshold
            )));
        }
        if c.text_pages == 0 {
            return Err(RtwError::InvalidConfig("text pages must be ≥ 1".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(RtwError::InvalidConfig("upload cap must be > 0".into()));
        }
        if c.vision.timeout_secs == 0 {
            return Err(RtwError::InvalidConfig("vision timeout must be > 0".into()));
        }
        Ok(self.config)
    }
}

// ── Online check ─────────────────────────────────────────────────────────

/// Configuration for one form-filling run.
#[derive(Clone)]
pub struct RunConfig {
    /// First page of the check. Default: [`DEFAULT_START_URL`].
    pub start_url: String,

    /// WebDriver endpoint used by [`crate::automation::WebDriverLauncher`].
    pub webdriver_url: String,

    /// Run the browser without a window. Default: true.
    pub headless: bool,

    /// Navigation attempts before the start page counts as unreachable.
    /// Default: 3.
    pub navigation_tries: u32,

    /// Backoff before retry `n` (1-based) is `base + step × (n − 1)`.
    /// Defaults: 900 ms and 700 ms.
    pub retry_base_ms: u64,
    pub retry_step_ms: u64,

    /// Bound on one navigation including the load wait. Default: 60 s.
    pub navigation_timeout_secs: u64,

    /// Bound on locating and clicking one control. Default: 20 s.
    pub click_timeout_secs: u64,

    /// Bound on fetching the result PDF. Default: 60 s.
    pub download_timeout_secs: u64,

    /// Ceiling for a whole step, whatever it is doing. Default: 120 s.
    pub step_timeout_secs: u64,

    /// Pause after the start page is shown. Default: 600 ms.
    pub settle_after_start_ms: u64,

    /// Pause after each "Continue". Default: 500 ms.
    pub settle_after_continue_ms: u64,

    /// Pause before scanning the result page. Default: 1200 ms.
    pub settle_before_result_ms: u64,

    /// Browser window size. Default: 1280×800.
    pub viewport: (u32, u32),

    /// Accept-Language / UI locale. Default: `en-GB`.
    pub locale: String,

    /// Default: a desktop Chrome string.
    pub user_agent: String,

    /// Write `rtw-<tag>.trace.zip` at the end of every run. Default: true.
    pub capture_trace: bool,

    /// Optional step progress events.
    pub progress_callback: Option<Arc<dyn RunProgressCallback>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            navigation_tries: 3,
            retry_base_ms: 900,
            retry_step_ms: 700,
            navigation_timeout_secs: 60,
            click_timeout_secs: 20,
            download_timeout_secs: 60,
            step_timeout_secs: 120,
            settle_after_start_ms: 600,
            settle_after_continue_ms: 500,
            settle_before_result_ms: 1200,
            viewport: (1280, 800),
            locale: "en-GB".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            capture_trace: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("start_url", &self.start_url)
            .field("webdriver_url", &self.webdriver_url)
            .field("headless", &self.headless)
            .field("navigation_tries", &self.navigation_tries)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("click_timeout_secs", &self.click_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("step_timeout_secs", &self.step_timeout_secs)
            .field("viewport", &self.viewport)
            .field("locale", &self.locale)
            .field("capture_trace", &self.capture_trace)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overridden by `RTW_START_URL`, `RTW_WEBDRIVER_URL` and
    /// `RTW_HEADLESS` (`0`/`false`/`no` shows the browser).
    pub fn from_env() -> Result<Self, RtwError> {
        let mut b = Self::builder();
        if let Some(url) = env_nonempty("RTW_START_URL") {
            b = b.start_url(url);
        }
        if let Some(url) = env_nonempty("RTW_WEBDRIVER_URL") {
            b = b.webdriver_url(url);
        }
        if let Some(v) = env_nonempty("RTW_HEADLESS") {
            b = b.headless(!matches!(
                v.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            ));
        }
        b.build()
    }

    /// Wait before navigation retry `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let n = u64::from(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_base_ms + self.retry_step_ms * n)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn click_timeout(&self) -> Duration {
        Duration::from_secs(self.click_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Worst case for the navigate step: every try timing out, the backoff
    /// between tries, the settle pause, and one second of slack.
    pub fn navigation_budget(&self) -> Duration {
        let tries = self.navigation_tries.max(1);
        let backoff: Duration = (1..tries).map(|attempt| self.retry_backoff(attempt)).sum();
        self.navigation_timeout() * tries
            + backoff
            + Duration::from_millis(self.settle_after_start_ms)
            + Duration::from_secs(1)
    }
}

/// Builder for [`RunConfig`].
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl fmt::Debug for RunConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.fmt(f)
    }
}

impl RunConfigBuilder {
    pub fn start_url(mut self, url: impl Into<String>) -> Self {
        self.config.start_url = url.into();
        self
    }

    pub fn webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn navigation_tries(mut self, n: u32) -> Self {
        self.config.navigation_tries = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, base: u64, step: u64) -> Self {
        self.config.retry_base_ms = base;
        self.config.retry_step_ms = step;
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs.max(1);
        self
    }

    pub fn click_timeout_secs(mut self, secs: u64) -> Self {
        self.config.click_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn step_timeout_secs(mut self, secs: u64) -> Self {
        self.config.step_timeout_secs = secs.clamp(1, 600);
        self
    }

    /// Set the three settle pauses at once (start, continue, result).
    pub fn settle_delays_ms(mut self, start: u64, cont: u64, result: u64) -> Self {
        self.config.settle_after_start_ms = start;
        self.config.settle_after_continue_ms = cont;
        self.config.settle_before_result_ms = result;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport = (width.max(320), height.max(240));
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn capture_trace(mut self, v: bool) -> Self {
        self.config.capture_trace = v;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn RunProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, RtwError> {
        let c = &self.config;
        if !(c.start_url.starts_with("http://") || c.start_url.starts_with("https://")) {
            return Err(RtwError::InvalidConfig(format!(
                "start URL must be http(s), got {:?}",
                c.start_url
            )));
        }
        if c.webdriver_url.trim().is_empty() {
            return Err(RtwError::InvalidConfig("WebDriver URL is empty".into()));
        }
        if c.step_timeout_secs < c.click_timeout_secs {
            return Err(RtwError::InvalidConfig(format!(
                "step timeout ({}s) must not be shorter than click timeout ({}s)",
                c.step_timeout_secs, c.click_timeout_secs
            )));
        }
        Ok(self.config)
    }
}

// ── Environment helpers ──────────────────────────────────────────────────

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_nonempty(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.confidence_threshold, 0.80);
        assert_eq!(c.dpi, 240);
        assert_eq!(c.text_pages, 2);
        assert_eq!(c.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(c.vision.fast_model, "gemini-2.0-flash-001");
        assert_eq!(c.vision.strong_model, "gemini-2.5-pro");
        assert_eq!(c.vision.api_key_env, "GEMINI_API_KEY");
        assert!(c.reference_year >= 2024);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ExtractionConfig::builder().dpi(1000).build().unwrap();
        assert_eq!(c.dpi, 400);
        let c = ExtractionConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn builder_rejects_bad_threshold() {
        assert!(ExtractionConfig::builder()
            .confidence_threshold(1.5)
            .build()
            .is_err());
        assert!(ExtractionConfig::builder()
            .confidence_threshold(-0.1)
            .build()
            .is_err());
    }

    #[test]
    fn builder_rejects_zero_text_pages() {
        assert!(ExtractionConfig::builder().text_pages(0).build().is_err());
    }

    #[test]
    fn vision_debug_hides_models() {
        let c = ExtractionConfig::default();
        let dbg = format!("{:?}", c.vision);
        assert!(dbg.contains("gemini-2.0-flash-001"));
    }

    #[test]
    fn run_defaults() {
        let c = RunConfig::default();
        assert_eq!(c.start_url, DEFAULT_START_URL);
        assert_eq!(c.navigation_tries, 3);
        assert_eq!(c.viewport, (1280, 800));
        assert_eq!(c.locale, "en-GB");
        assert!(c.user_agent.contains("Chrome/122"));
    }

    #[test]
    fn retry_backoff_grows_linearly() {
        let c = RunConfig::default();
        assert_eq!(c.retry_backoff(1), Duration::from_millis(900));
        assert_eq!(c.retry_backoff(2), Duration::from_millis(1600));
        assert_eq!(c.retry_backoff(3), Duration::from_millis(2300));
    }

    #[test]
    fn navigation_budget_covers_every_try() {
        let c = RunConfig::default();
        // 3 × 60 s + 900 ms + 1600 ms + 600 ms settle + 1 s
        assert_eq!(c.navigation_budget(), Duration::from_millis(184_100));
        assert!(c.navigation_budget() > c.step_timeout());
    }

    #[test]
    fn run_builder_validates_urls() {
        assert!(RunConfig::builder().start_url("ftp://x").build().is_err());
        assert!(RunConfig::builder().webdriver_url(" ").build().is_err());
        assert!(RunConfig::builder()
            .start_url("http://127.0.0.1:8080/start")
            .build()
            .is_ok());
    }

    #[test]
    fn run_builder_rejects_step_shorter_than_click() {
        assert!(RunConfig::builder()
            .click_timeout_secs(30)
            .step_timeout_secs(10)
            .build()
            .is_err());
    }
}
