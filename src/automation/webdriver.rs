//! [`BrowserSession`] over the W3C WebDriver HTTP protocol.
//!
//! Talks to a running `chromedriver` (or any W3C-compliant driver) at
//! [`RunConfig::webdriver_url`]. Only the handful of endpoints the run needs
//! are used: new session, navigate, find elements, clear/send keys, click,
//! page source, screenshot, print, cookies, execute script.
//!
//! ## Downloads
//!
//! WebDriver has no download API. The "Download PDF" link's `href` is
//! resolved against the current page and fetched with `reqwest`, replaying
//! the session's cookies and browser identity so the site serves the same
//! document the browser would have saved.

use crate::automation::browser::{BrowserLauncher, BrowserSession};
use crate::automation::locator::Locator;
use crate::config::RunConfig;
use crate::error::BrowserError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// W3C web element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Poll interval for element and load waits.
const POLL: Duration = Duration::from_millis(200);

/// Slack added to the HTTP timeout on top of the longest browser wait.
const HTTP_SLACK: Duration = Duration::from_secs(15);

/// Hides `navigator.webdriver` from page scripts.
const MASK_WEBDRIVER: &str = "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});";

/// Chrome arguments for a run.
pub fn chrome_args(config: &RunConfig) -> Vec<String> {
    let (w, h) = config.viewport;
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!("--window-size={w},{h}"),
        format!("--lang={}", config.locale),
        format!("--user-agent={}", config.user_agent),
    ];
    if config.headless {
        args.insert(0, "--headless=new".to_string());
    }
    args
}

/// `Accept-Language` value for `locale`, e.g. `en-GB,en;q=0.9`.
pub fn accept_language(locale: &str) -> String {
    match locale.split_once('-') {
        Some((lang, _)) => format!("{locale},{lang};q=0.9"),
        None => locale.to_string(),
    }
}

/// Starts Chrome sessions through a WebDriver endpoint.
#[derive(Debug, Default, Clone)]
pub struct WebDriverLauncher;

impl WebDriverLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, config: &RunConfig) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let longest = config
            .navigation_timeout()
            .max(config.download_timeout())
            .max(config.click_timeout());
        let http = reqwest::Client::builder()
            .timeout(longest + HTTP_SLACK)
            .build()
            .map_err(|e| BrowserError::Unavailable(e.to_string()))?;

        let base = config.webdriver_url.trim_end_matches('/').to_string();
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "timeouts": {
                        "pageLoad": config.navigation_timeout().as_millis() as u64,
                        "script": config.click_timeout().as_millis() as u64,
                        "implicit": 0
                    },
                    "goog:chromeOptions": {
                        "args": chrome_args(config),
                        "prefs": { "intl.accept_languages": accept_language(&config.locale) }
                    }
                }
            }
        });

        info!("Starting WebDriver session at {}", base);
        let response = http
            .post(format!("{base}/session"))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| BrowserError::Unavailable(format!("{base}: {e}")))?;
        let value = read_value("POST /session", response).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::BadResponse("new session without sessionId".into()))?
            .to_string();
        debug!("WebDriver session {}", id);

        let mut session = WebDriverSession {
            http,
            base,
            id,
            user_agent: config.user_agent.clone(),
            accept_language: accept_language(&config.locale),
            closed: false,
        };
        session.mask_webdriver().await;
        Ok(Box::new(session))
    }
}

/// One WebDriver session.
#[derive(Debug)]
pub struct WebDriverSession {
    http: reqwest::Client,
    base: String,
    id: String,
    user_agent: String,
    accept_language: String,
    closed: bool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}/session/{}{}", self.base, self.id, path);
        let label = format!("{method} {path}");
        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BrowserError::Timeout {
                    what: label.clone(),
                    ms: 0,
                }
            } else {
                BrowserError::Http(format!("{label}: {e}"))
            }
        })?;
        read_value(&label, response).await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let (using, value) = locator.to_webdriver();
        let found = self
            .command(Method::POST, "/elements", Some(json!({ "using": using, "value": value })))
            .await?;
        Ok(found
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn nth(&self, locator: &Locator, nth: usize) -> Result<String, BrowserError> {
        self.find_all(locator)
            .await?
            .into_iter()
            .nth(nth)
            .ok_or_else(|| BrowserError::NotFound(format!("{locator} #{nth}")))
    }

    /// First displayed match, polling until `timeout`.
    async fn wait_displayed(&self, locator: &Locator, timeout: Duration) -> Result<String, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            for id in self.find_all(locator).await? {
                let shown = self
                    .command(Method::GET, &format!("/element/{id}/displayed"), None)
                    .await
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if shown {
                    return Ok(id);
                }
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("{locator} to be visible"),
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn execute(&self, script: &str) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    /// Register the `navigator.webdriver` mask for every new document.
    /// Chrome-only; other drivers just skip it.
    async fn mask_webdriver(&mut self) {
        let body = json!({
            "cmd": "Page.addScriptToEvaluateOnNewDocument",
            "params": { "source": MASK_WEBDRIVER }
        });
        if let Err(e) = self.command(Method::POST, "/goog/cdp/execute", Some(body)).await {
            debug!("webdriver mask not installed: {}", e);
        }
    }

    async fn cookie_header(&self) -> Result<String, BrowserError> {
        let cookies = self.command(Method::GET, "/cookie", None).await?;
        Ok(cookies
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| {
                        let name = c.get("name")?.as_str()?;
                        let value = c.get("value")?.as_str()?;
                        Some(format!("{name}={value}"))
                    })
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default())
    }

    /// Absolute URL the element links to.
    async fn href_of(&self, id: &str) -> Result<Url, BrowserError> {
        let current = self.command(Method::GET, "/url", None).await?;
        let current = current.as_str().unwrap_or_default();
        let href = self
            .command(Method::GET, &format!("/element/{id}/property/href"), None)
            .await?;
        let href = match href.as_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => self
                .command(Method::GET, &format!("/element/{id}/attribute/href"), None)
                .await?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| BrowserError::BadResponse("download link has no href".into()))?,
        };
        let base = Url::parse(current).map_err(|e| BrowserError::BadResponse(format!("current URL {current:?}: {e}")))?;
        base.join(&href)
            .map_err(|e| BrowserError::BadResponse(format!("href {href:?}: {e}")))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<Option<u16>, BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(None)
    }

    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.execute("return document.readyState").await?;
            if matches!(state.as_str(), Some("interactive") | Some("complete")) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: "page load".into(),
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let url = self.command(Method::GET, "/url", None).await?;
        url.as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::BadResponse("URL is not a string".into()))
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize, BrowserError> {
        Ok(self.find_all(locator).await?.len())
    }

    async fn fill(&mut self, locator: &Locator, nth: usize, value: &str) -> Result<(), BrowserError> {
        let id = self.nth(locator, nth).await?;
        self.command(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        let id = self.wait_displayed(locator, timeout).await?;
        self.command(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        let source = self.command(Method::GET, "/source", None).await?;
        source
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::BadResponse("page source is not a string".into()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let b64 = self.command(Method::GET, "/screenshot", None).await?;
        decode_b64("screenshot", &b64)
    }

    async fn print_pdf(&mut self) -> Result<Vec<u8>, BrowserError> {
        let b64 = self
            .command(
                Method::POST,
                "/print",
                Some(json!({ "background": true, "orientation": "portrait" })),
            )
            .await?;
        decode_b64("print", &b64)
    }

    async fn download(&mut self, locator: &Locator, timeout: Duration) -> Result<Vec<u8>, BrowserError> {
        let id = self.wait_displayed(locator, timeout).await?;
        let url = self.href_of(&id).await?;
        let cookies = self.cookie_header().await?;
        info!("Downloading result from {}", url);

        let mut req = self
            .http
            .get(url.clone())
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT_LANGUAGE, &self.accept_language)
            .header(reqwest::header::ACCEPT, "application/pdf,*/*;q=0.8");
        if !cookies.is_empty() {
            req = req.header(reqwest::header::COOKIE, cookies);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BrowserError::Timeout {
                    what: format!("download of {url}"),
                    ms: timeout.as_millis() as u64,
                }
            } else {
                BrowserError::Http(format!("GET {url}: {e}"))
            }
        })?;
        if !response.status().is_success() {
            return Err(BrowserError::Http(format!("GET {url}: HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrowserError::Http(format!("GET {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let url = format!("{}/session/{}", self.base, self.id);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| BrowserError::Http(format!("DELETE /session: {e}")))?;
        read_value("DELETE /session", response).await.map(|_| ())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("WebDriver session {} dropped without close", self.id);
        }
    }
}

/// Unwrap the `value` member of a driver response, mapping W3C errors.
async fn read_value(command: &str, response: reqwest::Response) -> Result<Value, BrowserError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| BrowserError::BadResponse(format!("{command}: {e}")))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(match error {
            "no such element" => BrowserError::NotFound(message),
            "timeout" | "script timeout" => BrowserError::Timeout {
                what: command.to_string(),
                ms: 0,
            },
            _ => BrowserError::Protocol {
                command: command.to_string(),
                error: error.to_string(),
                message,
            },
        });
    }
    if !status.is_success() {
        return Err(BrowserError::Http(format!("{command}: HTTP {status}")));
    }
    Ok(value)
}

fn decode_b64(what: &str, value: &Value) -> Result<Vec<u8>, BrowserError> {
    let s = value
        .as_str()
        .ok_or_else(|| BrowserError::BadResponse(format!("{what} is not base64 text")))?;
    STANDARD
        .decode(s)
        .map_err(|e| BrowserError::BadResponse(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_args() {
        let config = RunConfig::default();
        let args = chrome_args(&config);
        assert_eq!(args[0], "--headless=new");
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--window-size=1280,800".to_string()));
        assert!(args.contains(&"--lang=en-GB".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=") && a.contains("Chrome/122")));
    }

    #[test]
    fn headed_args() {
        let config = RunConfig::builder().headless(false).build().unwrap();
        assert!(!chrome_args(&config).iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn accept_language_header() {
        assert_eq!(accept_language("en-GB"), "en-GB,en;q=0.9");
        assert_eq!(accept_language("fr"), "fr");
    }

    #[test]
    fn base64_payloads() {
        assert_eq!(decode_b64("x", &json!("JVBERg==")).unwrap(), b"%PDF");
        assert!(decode_b64("x", &json!(1)).is_err());
    }
}
