//! The browser seam.
//!
//! The runner drives the site through [`BrowserSession`] only. The shipped
//! implementation speaks WebDriver ([`super::webdriver`]); tests use an
//! in-memory fake. One session belongs to one run and is never shared.

use crate::automation::locator::Locator;
use crate::config::RunConfig;
use crate::error::BrowserError;
use async_trait::async_trait;
use std::time::Duration;

/// One exclusive browser page plus its network context.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and return the HTTP status when the driver knows it.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<Option<u16>, BrowserError>;

    /// Wait until the current document has finished loading.
    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// Number of elements matching `locator` right now.
    async fn count(&mut self, locator: &Locator) -> Result<usize, BrowserError>;

    /// Replace the value of the `nth` match.
    async fn fill(&mut self, locator: &Locator, nth: usize, value: &str) -> Result<(), BrowserError>;

    /// Click the first match once it is displayed, waiting up to `timeout`.
    async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError>;

    /// Serialised DOM of the current page.
    async fn content(&mut self) -> Result<String, BrowserError>;

    /// PNG of the current page.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// The current page printed to PDF.
    async fn print_pdf(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// Follow the first match and return the downloaded bytes.
    async fn download(&mut self, locator: &Locator, timeout: Duration) -> Result<Vec<u8>, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Starts a fresh session for each run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &RunConfig) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
