//! Diagnostic trace of one run, written as `rtw-<tag>.trace.zip`.
//!
//! The archive holds `trace.json` (the step log, plus the URL of every
//! snapshot) and `pages/NN-<step>.html` (page source captured after each
//! step). It is built in memory and only
//! touches disk once, at the end of the run.

use crate::error::RunError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// How a traced step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Started,
    Ok,
    Retry,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    /// RFC 3339, UTC.
    pub at: String,
    /// Milliseconds since the run started.
    pub elapsed_ms: i64,
    pub step: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct TraceDocument<'a> {
    started_at: String,
    start_url: &'a str,
    events: &'a [TraceEvent],
    pages: Vec<PageEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct PageEntry<'a> {
    file: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Debug)]
struct PageSnapshot {
    file: String,
    url: Option<String>,
    html: String,
}

/// Collects events and page snapshots while a run progresses.
#[derive(Debug)]
pub struct TraceRecorder {
    started: DateTime<Utc>,
    start_url: String,
    events: Vec<TraceEvent>,
    pages: Vec<PageSnapshot>,
}

impl TraceRecorder {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            started: Utc::now(),
            start_url: start_url.into(),
            events: Vec::new(),
            pages: Vec::new(),
        }
    }

    pub fn record(&mut self, step: &str, outcome: StepOutcome, detail: Option<String>) {
        let now = Utc::now();
        self.events.push(TraceEvent {
            at: now.to_rfc3339(),
            elapsed_ms: (now - self.started).num_milliseconds(),
            step: step.to_string(),
            outcome,
            detail,
        });
    }

    /// Keep the page source, and the URL it came from, seen at the end of
    /// `step`.
    pub fn snapshot(&mut self, step: &str, url: Option<String>, html: String) {
        let file = format!("pages/{:02}-{}.html", self.pages.len() + 1, step);
        self.pages.push(PageSnapshot { file, url, html });
    }

    /// Serialise to a zip archive.
    pub fn to_zip(&self) -> Result<Vec<u8>, RunError> {
        let doc = TraceDocument {
            started_at: self.started.to_rfc3339(),
            start_url: &self.start_url,
            events: &self.events,
            pages: self
                .pages
                .iter()
                .map(|p| PageEntry {
                    file: &p.file,
                    url: p.url.as_deref(),
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(|e| trace_error(e.to_string()))?;

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file("trace.json", options)
            .map_err(|e| trace_error(e.to_string()))?;
        zip.write_all(&json).map_err(|e| trace_error(e.to_string()))?;

        for page in &self.pages {
            zip.start_file(page.file.as_str(), options)
                .map_err(|e| trace_error(e.to_string()))?;
            zip.write_all(page.html.as_bytes())
                .map_err(|e| trace_error(e.to_string()))?;
        }

        let cursor = zip.finish().map_err(|e| trace_error(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

fn trace_error(detail: String) -> RunError {
    RunError::Io {
        path: "trace.zip".into(),
        source: std::io::Error::other(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_holds_log_and_pages() {
        let mut trace = TraceRecorder::new("https://example.test/start");
        trace.record("navigate", StepOutcome::Started, None);
        trace.record("navigate", StepOutcome::Ok, Some("HTTP 200".into()));
        trace.snapshot(
            "navigate",
            Some("https://example.test/start".into()),
            "<html>start</html>".into(),
        );
        trace.snapshot("share_code", None, "<html>share</html>".into());

        let bytes = trace.to_zip().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);

        let mut json = String::new();
        archive
            .by_name("trace.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["start_url"], "https://example.test/start");
        assert_eq!(v["events"][1]["outcome"], "ok");
        assert_eq!(v["events"][1]["detail"], "HTTP 200");
        assert_eq!(v["pages"][0]["url"], "https://example.test/start");
        assert_eq!(v["pages"][1]["file"], "pages/02-share_code.html");
        assert!(v["pages"][1].get("url").is_none());

        let mut page = String::new();
        archive
            .by_name("pages/01-navigate.html")
            .unwrap()
            .read_to_string(&mut page)
            .unwrap();
        assert_eq!(page, "<html>start</html>");
    }

    #[test]
    fn empty_trace_still_archives() {
        let bytes = TraceRecorder::new("http://x").to_zip().unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
