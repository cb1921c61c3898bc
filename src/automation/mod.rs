//! Driving the online Right to Work check.
//!
//! ```text
//! RunRequest ──validate──▶ runner ──▶ BrowserSession (trait) ──▶ site
//!                            │             └─ WebDriverSession (W3C)
//!                            ├─ fields   ordered locator strategies
//!                            ├─ detect   error-summary classification
//!                            └─ trace / artifacts   files in out_dir
//! ```
//!
//! 1. [`browser`]   — the session seam the runner depends on
//! 2. [`locator`]   — driver-neutral element locators
//! 3. [`fields`]    — fill and click plans, first matching strategy wins
//! 4. [`detect`]    — recognise the site's own validation errors
//! 5. [`runner`]    — the step sequence, retries, timeouts, diagnostics
//! 6. [`trace`], [`artifacts`] — what a run leaves on disk
//! 7. [`webdriver`] — the shipped `BrowserSession`

pub mod artifacts;
pub mod browser;
pub mod detect;
pub mod fields;
pub mod locator;
pub mod runner;
pub mod trace;
pub mod webdriver;

pub use browser::{BrowserLauncher, BrowserSession};
pub use detect::{detect_site_error, SiteErrorKind};
pub use locator::{Locator, Role};
pub use runner::{run_check, Step};
pub use webdriver::{WebDriverLauncher, WebDriverSession};
