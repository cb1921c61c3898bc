//! Progress-callback trait for per-step events of the online check.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::RunConfigBuilder::progress_callback`] to receive events
//! as the runner moves through the site's pages.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal spinner, a WebSocket or a log
//! without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use rtw_check::{RunConfig, RunProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl RunProgressCallback for Printer {
//!     fn on_step_start(&self, step: &str, index: usize, total: usize) {
//!         eprintln!("[{index}/{total}] {step}");
//!     }
//! }
//!
//! let config = RunConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn RunProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the runner as it drives each step.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. One run calls these sequentially from one task.
pub trait RunProgressCallback: Send + Sync {
    /// Called once, after validation and before the browser starts.
    ///
    /// # Arguments
    /// * `total_steps` — number of steps the run will attempt
    fn on_run_start(&self, total_steps: usize) {
        let _ = total_steps;
    }

    /// Called as a step begins.
    ///
    /// # Arguments
    /// * `step`  — short step name (`"share_code"`, `"download"`, …)
    /// * `index` — 1-based position of the step
    /// * `total` — total steps
    fn on_step_start(&self, step: &str, index: usize, total: usize) {
        let _ = (step, index, total);
    }

    /// Called when a step finished.
    ///
    /// # Arguments
    /// * `step`     — short step name
    /// * `strategy` — the locator that worked, if the step looked one up
    fn on_step_complete(&self, step: &str, strategy: Option<&str>) {
        let _ = (step, strategy);
    }

    /// Called when a step failed; the run stops after this.
    fn on_step_error(&self, step: &str, error: &str) {
        let _ = (step, error);
    }

    /// Called once at the very end, success or not.
    fn on_run_complete(&self, ok: bool) {
        let _ = ok;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RunConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
