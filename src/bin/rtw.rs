//! CLI binary for rtw-check.
//!
//! A thin shim over the library crate: `extract` reads the two fields off
//! documents, `run` drives the online check from explicit values, `check`
//! does both.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rtw_check::{
    extract_files, run_check, DateOfBirth, ExtractionConfig, ExtractionResult, RunConfig, RunProgressCallback,
    RunRequest, RunResult, ShareCode, WebDriverLauncher,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Check");
        bar.set_message("starting browser…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_steps: usize) {
        self.bar.set_message(format!("{total_steps} steps"));
    }

    fn on_step_start(&self, step: &str, index: usize, total: usize) {
        self.bar.set_prefix(format!("{index}/{total}"));
        self.bar.set_message(step.to_string());
    }

    fn on_step_complete(&self, step: &str, strategy: Option<&str>) {
        self.bar.println(format!(
            "  {} {:<14} {}",
            green("✓"),
            step,
            dim(strategy.unwrap_or(""))
        ));
    }

    fn on_step_error(&self, step: &str, error: &str) {
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<14} {}", red("✗"), step, red(&msg)));
    }

    fn on_run_complete(&self, _ok: bool) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read the share code and date of birth from two documents
  rtw extract share-code-letter.pdf passport.jpg

  # Same, as JSON
  rtw extract --json share.pdf dob.png

  # Run the online check with known values
  rtw run --share-code "W7X 4PK 9QR" --dob 13/08/1992 --company "Acme Ltd"

  # Extract, then run the check when both fields were found
  rtw check share.pdf passport.pdf --company "Acme Ltd" -o ./output

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Enables the vision fallback (absent: text layer only)
  GEMINI_MODEL_FAST     Fast vision model   (default gemini-2.0-flash-001)
  GEMINI_MODEL_STRONG   Strong vision model (default gemini-2.5-pro)
  RTW_VISION_PROVIDER   Provider name for the vision models (default gemini)
  RTW_CONF_THRESHOLD    Confidence below which vision is used (default 0.80)
  RTW_RENDER_DPI        Render DPI for the vision fallback (default 240)
  RTW_WEBDRIVER_URL     WebDriver endpoint (default http://localhost:9515)
  RTW_START_URL         First page of the check
  PDFIUM_LIB_PATH       Path to libpdfium

SETUP:
  1. Install PDFium (or set PDFIUM_LIB_PATH).
  2. For `run`/`check`, start chromedriver:  chromedriver --port=9515
"#;

/// Right to Work share-code extraction and online check.
#[derive(Parser, Debug)]
#[command(
    name = "rtw",
    version,
    about = "Extract UK Right to Work share codes and dates of birth, then run the online check",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "RTW_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "RTW_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RTW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true, env = "RTW_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the share code and date of birth from two documents.
    Extract {
        #[command(flatten)]
        docs: DocArgs,
        #[command(flatten)]
        vision: VisionArgs,
    },
    /// Run the online check with explicit values.
    Run {
        /// Nine-character share code (spaces and dashes are ignored).
        #[arg(long)]
        share_code: String,
        /// Date of birth as DD/MM/YYYY.
        #[arg(long)]
        dob: String,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Extract from documents, then run the check.
    Check {
        #[command(flatten)]
        docs: DocArgs,
        #[command(flatten)]
        vision: VisionArgs,
        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[derive(Args, Debug)]
struct DocArgs {
    /// Document carrying the share code (PDF, image or .txt).
    share_doc: PathBuf,
    /// Document carrying the date of birth (PDF, image or .txt).
    dob_doc: PathBuf,
}

#[derive(Args, Debug)]
struct VisionArgs {
    /// Vision provider name.
    #[arg(long, env = "RTW_VISION_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Fast vision model, tried first.
    #[arg(long, env = "GEMINI_MODEL_FAST", default_value = "gemini-2.0-flash-001")]
    fast_model: String,

    /// Strong vision model, tried when the fast answer is incomplete.
    #[arg(long, env = "GEMINI_MODEL_STRONG", default_value = "gemini-2.5-pro")]
    strong_model: String,

    /// Confidence a text-layer field needs to skip the vision fallback.
    #[arg(long, env = "RTW_CONF_THRESHOLD", default_value_t = 0.80)]
    threshold: f32,

    /// Rendering DPI (72–400).
    #[arg(long, env = "RTW_RENDER_DPI", default_value_t = 240,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Per-call vision timeout in seconds.
    #[arg(long, env = "RTW_VISION_TIMEOUT", default_value_t = 60)]
    vision_timeout: u64,

    /// Never call the vision model.
    #[arg(long)]
    no_vision: bool,
}

#[derive(Args, Debug)]
struct BrowserArgs {
    /// Company name entered on the last form page.
    #[arg(long, env = "RTW_COMPANY")]
    company: String,

    /// Output directory. Default: ./output/rtw-YYYYMMDD.
    #[arg(short, long, env = "RTW_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// WebDriver endpoint.
    #[arg(long, env = "RTW_WEBDRIVER_URL", default_value = rtw_check::config::DEFAULT_WEBDRIVER_URL)]
    webdriver_url: String,

    /// First page of the check.
    #[arg(long, env = "RTW_START_URL", default_value = rtw_check::config::DEFAULT_START_URL)]
    start_url: String,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    /// Do not write the trace archive.
    #[arg(long)]
    no_trace: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would fight the spinner; keep them for runs
    // without one.
    let drives_browser = !matches!(cli.command, Command::Extract { .. });
    let show_progress = drives_browser && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Extract { docs, vision } => {
            let result = extract(docs, vision).await?;
            print_extraction(&cli, &result)?;
        }
        Command::Run {
            share_code,
            dob,
            browser,
        } => {
            let share = ShareCode::parse(share_code)
                .with_context(|| format!("Invalid share code {share_code:?} (must be 9 characters)"))?;
            let dob: DateOfBirth = dob.parse().map_err(anyhow::Error::msg)?;
            let result = run(&cli, &share, &dob, browser, show_progress).await?;
            finish_run(&cli, &result)?;
        }
        Command::Check {
            docs,
            vision,
            browser,
        } => {
            let extracted = extract(docs, vision).await?;
            print_extraction(&cli, &extracted)?;
            let (Some(share), Some(dob)) = (extracted.share_code(), extracted.date_of_birth()) else {
                bail!("Could not read both the share code and the date of birth; not running the check");
            };
            if !extracted.is_complete(vision.threshold) && !cli.quiet {
                eprintln!(
                    "{} low confidence (share {:.2}, dob {:.2}); running anyway",
                    bold("!"),
                    extracted.confidence.share_code,
                    extracted.confidence.dob
                );
            }
            let result = run(&cli, &share, &dob, browser, show_progress).await?;
            finish_run(&cli, &result)?;
        }
    }
    Ok(())
}

async fn extract(docs: &DocArgs, vision: &VisionArgs) -> Result<ExtractionResult> {
    let config = ExtractionConfig::builder()
        .vision_provider(&vision.provider)
        .fast_model(&vision.fast_model)
        .strong_model(&vision.strong_model)
        .confidence_threshold(vision.threshold)
        .dpi(vision.dpi)
        .vision_timeout_secs(vision.vision_timeout)
        .vision_enabled(!vision.no_vision)
        .build()
        .context("Invalid configuration")?;

    extract_files(&docs.share_doc, &docs.dob_doc, &config)
        .await
        .context("Extraction failed")
}

async fn run(
    cli: &Cli,
    share: &ShareCode,
    dob: &DateOfBirth,
    browser: &BrowserArgs,
    show_progress: bool,
) -> Result<RunResult> {
    let out_dir = browser.out_dir.clone().unwrap_or_else(|| {
        rtw_check::automation::artifacts::daily_dir(
            &PathBuf::from("output"),
            chrono::Local::now().date_naive(),
        )
    });

    let mut builder = RunConfig::builder()
        .webdriver_url(&browser.webdriver_url)
        .start_url(&browser.start_url)
        .headless(!browser.headed)
        .capture_trace(!browser.no_trace);
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new() as Arc<dyn RunProgressCallback>);
    }
    let config = builder.build().context("Invalid configuration")?;

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {} · {} · {}",
            bold("Checking"),
            share.display(),
            dob,
            browser.company
        );
    }

    let request = RunRequest::new(share, dob, &browser.company, out_dir);
    Ok(run_check(&WebDriverLauncher::new(), &request, &config).await)
}

fn print_extraction(cli: &Cli, r: &ExtractionResult) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(r).context("Failed to serialise result")?
        );
        return Ok(());
    }
    let or_dash = |s: &str| if s.is_empty() { "—".to_string() } else { s.to_string() };
    let dob = if r.dob_day.is_empty() {
        "—".to_string()
    } else {
        format!("{}/{}/{}", r.dob_day, r.dob_month, r.dob_year)
    };
    println!(
        "Share code:  {:<12} {}",
        or_dash(&r.share_code_display),
        dim(&format!("{:.2} {}", r.confidence.share_code, r.confidence.share_reason))
    );
    println!(
        "DOB:         {:<12} {}",
        dob,
        dim(&format!("{:.2} {}", r.confidence.dob, r.confidence.dob_reason))
    );
    if !cli.quiet {
        println!("Vision used: {}", if r.ai_used { "yes" } else { "no" });
        if !r.ai_notes.is_empty() {
            println!("Notes:       {}", dim(&r.ai_notes));
        }
    }
    Ok(())
}

fn finish_run(cli: &Cli, r: &RunResult) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(r).context("Failed to serialise result")?
        );
    } else if r.ok {
        if let Some(path) = &r.pdf_path {
            eprintln!("{} saved {}", green("✔"), bold(&path.display().to_string()));
        }
    } else {
        eprintln!(
            "{} {}",
            red("✘"),
            r.error.as_deref().unwrap_or("run failed")
        );
        for (label, path) in [
            ("screenshot", &r.error_png),
            ("error page", &r.error_pdf),
            ("trace", &r.trace_path),
        ] {
            if let Some(p) = path {
                eprintln!("   {:<10} {}", dim(label), p.display());
            }
        }
    }
    if !r.ok {
        std::process::exit(2);
    }
    Ok(())
}
