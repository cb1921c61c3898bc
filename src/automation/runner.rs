//! The form-filling state machine.
//!
//! ```text
//! navigate ─▶ start_now ─▶ share_code ─▶ date_of_birth ─▶ company_name ─▶ download
//!  (retry)                  + continue    + continue       + continue       save PDF
//!                                         + error scan     + error scan
//! ```
//!
//! Every step runs under the per-step ceiling and every wait inside it has
//! its own bound, so a run always terminates. [`run_check`] never returns an
//! error: every failure becomes a [`RunResult`] with `ok == false`, after a
//! best-effort screenshot and trace. Artifact failures are logged and never
//! replace the primary outcome.

use crate::automation::artifacts::{ensure_dir, write_artifact, ArtifactPaths};
use crate::automation::browser::{BrowserLauncher, BrowserSession};
use crate::automation::detect::detect_site_error;
use crate::automation::fields::{ClickPlan, FieldPlan};
use crate::automation::trace::{StepOutcome, TraceRecorder};
use crate::config::RunConfig;
use crate::error::RunError;
use crate::output::{RunFailureKind, RunRequest, RunResult, ValidatedRun};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The steps of one run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Navigate,
    StartNow,
    ShareCode,
    DateOfBirth,
    CompanyName,
    Download,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Navigate,
        Step::StartNow,
        Step::ShareCode,
        Step::DateOfBirth,
        Step::CompanyName,
        Step::Download,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Navigate => "navigate",
            Step::StartNow => "start_now",
            Step::ShareCode => "share_code",
            Step::DateOfBirth => "date_of_birth",
            Step::CompanyName => "company_name",
            Step::Download => "download",
        }
    }
}

/// Run the online check for `request` in a fresh browser session.
///
/// Input is validated before any browser starts. The output directory is
/// created if needed.
pub async fn run_check(launcher: &dyn BrowserLauncher, request: &RunRequest, config: &RunConfig) -> RunResult {
    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));

    let validated = match request.validate() {
        Ok(v) => v,
        Err(msg) => {
            warn!("Rejected run request: {}", msg);
            progress.on_run_complete(false);
            return RunResult::failure(RunFailureKind::Validation, msg);
        }
    };

    if let Err(e) = ensure_dir(&request.out_dir).await {
        progress.on_run_complete(false);
        return RunResult::failure(e.kind(), e.to_string());
    }
    let paths = ArtifactPaths::now(&request.out_dir);
    info!("Starting run {} → {}", paths.tag, request.out_dir.display());
    progress.on_run_start(Step::ALL.len());

    let mut trace = TraceRecorder::new(&config.start_url);
    trace.record("launch", StepOutcome::Started, None);

    let session = match launcher.launch(config).await {
        Ok(s) => s,
        Err(e) => {
            let err = RunError::from(e);
            warn!("Browser launch failed: {}", err);
            trace.record("launch", StepOutcome::Failed, Some(err.to_string()));
            let mut result = RunResult::failure(err.kind(), err.to_string());
            result.trace_path = write_trace(&trace, &paths, config).await;
            progress.on_run_complete(false);
            return result;
        }
    };
    trace.record("launch", StepOutcome::Ok, None);

    let mut run = Run {
        session,
        config,
        paths: &paths,
        trace,
        progress: Arc::clone(&progress),
        error_pdf: None,
    };
    let outcome = run.steps(&validated).await;
    let result = run.finish(outcome).await;
    progress.on_run_complete(result.ok);
    result
}

/// State owned by one run.
struct Run<'a> {
    session: Box<dyn BrowserSession>,
    config: &'a RunConfig,
    paths: &'a ArtifactPaths,
    trace: TraceRecorder,
    progress: ProgressCallback,
    error_pdf: Option<PathBuf>,
}

impl Run<'_> {
    async fn steps(&mut self, values: &ValidatedRun) -> Result<PathBuf, RunError> {
        let total = Step::ALL.len();
        for (index, step) in Step::ALL.into_iter().enumerate() {
            let name = step.name();
            info!("Step {}/{}: {}", index + 1, total, name);
            self.progress.on_step_start(name, index + 1, total);
            self.trace.record(name, StepOutcome::Started, None);

            // Navigation bounds each try itself; its ceiling must outlast them all.
            let ceiling = match step {
                Step::Navigate => self.config.step_timeout().max(self.config.navigation_budget()),
                _ => self.config.step_timeout(),
            };
            let outcome = match tokio::time::timeout(ceiling, self.execute(step, values)).await {
                Ok(r) => r,
                Err(_) => Err(RunError::StepTimeout {
                    step: name.to_string(),
                    secs: ceiling.as_secs(),
                }),
            };

            match outcome {
                Ok(strategy) => {
                    debug!("Step {} done via {:?}", name, strategy);
                    self.trace.record(name, StepOutcome::Ok, strategy.clone());
                    self.snapshot(name).await;
                    self.progress.on_step_complete(name, strategy.as_deref());
                }
                Err(e) => {
                    warn!("Step {} failed: {}", name, e);
                    self.trace.record(name, StepOutcome::Failed, Some(e.to_string()));
                    self.snapshot(name).await;
                    self.progress.on_step_error(name, &e.to_string());
                    return Err(e);
                }
            }
        }
        Ok(self.paths.result_pdf.clone())
    }

    /// One step. Returns the strategy that found the control, if any.
    async fn execute(&mut self, step: Step, values: &ValidatedRun) -> Result<Option<String>, RunError> {
        let cfg = self.config;
        match step {
            Step::Navigate => {
                let status = self.navigate_with_retry().await?;
                settle(cfg.settle_after_start_ms).await;
                Ok(status.map(|s| format!("HTTP {s}")))
            }
            Step::StartNow => {
                let via = ClickPlan::start_now()
                    .click(self.session.as_mut(), cfg.click_timeout())
                    .await?;
                self.session.wait_for_load(cfg.navigation_timeout()).await?;
                settle(cfg.settle_after_start_ms).await;
                Ok(Some(via))
            }
            Step::ShareCode => {
                let via = FieldPlan::share_code()
                    .fill(self.session.as_mut(), &[values.share_code.as_str()])
                    .await?;
                self.continue_and_settle(cfg.settle_after_continue_ms).await?;
                Ok(Some(via))
            }
            Step::DateOfBirth => {
                let dob = &values.date_of_birth;
                let (day, month, year) = (dob.day_str(), dob.month_str(), dob.year_str());
                let via = FieldPlan::date_of_birth()
                    .fill(self.session.as_mut(), &[day.as_str(), month.as_str(), year.as_str()])
                    .await?;
                self.continue_and_settle(cfg.settle_after_continue_ms).await?;
                self.check_site_error().await?;
                Ok(Some(via))
            }
            Step::CompanyName => {
                let via = FieldPlan::company_name()
                    .fill(self.session.as_mut(), &[values.company_name.as_str()])
                    .await?;
                self.continue_and_settle(cfg.settle_before_result_ms).await?;
                self.check_site_error().await?;
                Ok(Some(via))
            }
            Step::Download => {
                let (bytes, via) = ClickPlan::download_pdf()
                    .download(self.session.as_mut(), cfg.download_timeout())
                    .await?;
                if !bytes.starts_with(b"%PDF") {
                    warn!("Downloaded file does not look like a PDF ({} bytes)", bytes.len());
                }
                write_artifact(&self.paths.result_pdf, &bytes).await?;
                info!(
                    "Saved {} ({} bytes)",
                    self.paths.result_pdf.display(),
                    bytes.len()
                );
                Ok(Some(via))
            }
        }
    }

    /// Load the start page, retrying transient failures with linear backoff.
    async fn navigate_with_retry(&mut self) -> Result<Option<u16>, RunError> {
        let cfg = self.config;
        let url = cfg.start_url.as_str();
        let bound = cfg.navigation_timeout();
        let mut last = String::from("no attempt made");

        for attempt in 1..=cfg.navigation_tries {
            match tokio::time::timeout(bound, self.session.goto(url, bound)).await {
                Ok(Ok(Some(status))) if status >= 400 => last = format!("HTTP {status}"),
                Ok(Ok(status)) => return Ok(status),
                Ok(Err(e)) => last = e.to_string(),
                Err(_) => last = format!("timed out after {}s", bound.as_secs()),
            }
            warn!(
                "Navigation attempt {}/{} to {} failed: {}",
                attempt, cfg.navigation_tries, url, last
            );
            self.trace
                .record("navigate", StepOutcome::Retry, Some(last.clone()));
            if attempt < cfg.navigation_tries {
                tokio::time::sleep(cfg.retry_backoff(attempt)).await;
            }
        }

        Err(RunError::Navigation {
            url: url.to_string(),
            detail: last,
        })
    }

    async fn continue_and_settle(&mut self, settle_ms: u64) -> Result<(), RunError> {
        let cfg = self.config;
        ClickPlan::continue_button()
            .click(self.session.as_mut(), cfg.click_timeout())
            .await?;
        self.session.wait_for_load(cfg.navigation_timeout()).await?;
        settle(settle_ms).await;
        Ok(())
    }

    /// Abort with a typed failure when the page shows an error summary,
    /// printing the page to `RTW-Error-<tag>.pdf` first.
    async fn check_site_error(&mut self) -> Result<(), RunError> {
        let html = self.session.content().await?;
        let Some((kind, message)) = detect_site_error(&html) else {
            return Ok(());
        };
        warn!("Site reported an error ({}): {}", kind, message);

        match self.session.print_pdf().await {
            Ok(pdf) => match write_artifact(&self.paths.error_pdf, &pdf).await {
                Ok(()) => self.error_pdf = Some(self.paths.error_pdf.clone()),
                Err(e) => warn!("Could not save error PDF: {}", e),
            },
            Err(e) => warn!("Could not print error page: {}", e),
        }

        Err(RunError::SiteReported { kind, message })
    }

    /// Keep the current page source and URL in the trace.
    async fn snapshot(&mut self, step: &str) {
        if !self.config.capture_trace {
            return;
        }
        let bound = self.config.click_timeout();
        let url = match tokio::time::timeout(bound, self.session.current_url()).await {
            Ok(Ok(url)) => Some(url),
            Ok(Err(e)) => {
                debug!("No URL after {}: {}", step, e);
                None
            }
            Err(_) => None,
        };
        match tokio::time::timeout(bound, self.session.content()).await {
            Ok(Ok(html)) => self.trace.snapshot(step, url, html),
            Ok(Err(e)) => debug!("No page snapshot after {}: {}", step, e),
            Err(_) => debug!("Page snapshot after {} timed out", step),
        }
    }

    /// Capture diagnostics, write the trace, close the browser and build the
    /// result.
    async fn finish(mut self, outcome: Result<PathBuf, RunError>) -> RunResult {
        let mut result = match outcome {
            Ok(pdf_path) => RunResult::success(pdf_path, None),
            Err(e) => {
                let mut r = RunResult::failure(e.kind(), e.to_string());
                r.error_png = self.capture_screenshot().await;
                r.error_pdf = self.error_pdf.take();
                r
            }
        };

        result.trace_path = write_trace(&self.trace, self.paths, self.config).await;

        let bound = self.config.click_timeout();
        match tokio::time::timeout(bound, self.session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Closing browser failed: {}", e),
            Err(_) => warn!("Closing browser timed out"),
        }

        if result.ok {
            info!("Run {} succeeded", self.paths.tag);
        } else {
            warn!(
                "Run {} failed: {}",
                self.paths.tag,
                result.error.as_deref().unwrap_or("")
            );
        }
        result
    }

    async fn capture_screenshot(&mut self) -> Option<PathBuf> {
        let bound = self.config.click_timeout();
        let png = match tokio::time::timeout(bound, self.session.screenshot()).await {
            Ok(Ok(png)) => png,
            Ok(Err(e)) => {
                warn!("Screenshot failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("Screenshot timed out");
                return None;
            }
        };
        match write_artifact(&self.paths.error_png, &png).await {
            Ok(()) => Some(self.paths.error_png.clone()),
            Err(e) => {
                warn!("Could not save screenshot: {}", e);
                None
            }
        }
    }
}

async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn write_trace(trace: &TraceRecorder, paths: &ArtifactPaths, config: &RunConfig) -> Option<PathBuf> {
    if !config.capture_trace {
        return None;
    }
    let bytes = match trace.to_zip() {
        Ok(b) => b,
        Err(e) => {
            warn!("Could not build trace: {}", e);
            return None;
        }
    };
    match write_artifact(&paths.trace, &bytes).await {
        Ok(()) => Some(paths.trace.clone()),
        Err(e) => {
            warn!("Could not save trace: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_order() {
        let names: Vec<_> = Step::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "navigate",
                "start_now",
                "share_code",
                "date_of_birth",
                "company_name",
                "download"
            ]
        );
    }
}
