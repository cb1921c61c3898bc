//! Recognise the site's own validation errors.
//!
//! A phrase like "not found" also appears in ordinary guidance text, so a
//! page only counts as an error page when it carries an error-summary
//! element (`govuk-error-summary` or `error-summary` class). Phrases are then
//! matched against the visible text, specific kinds before the generic
//! "there is a problem".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of failure the site reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteErrorKind {
    /// The share code is no longer valid.
    Expired,
    /// The date of birth does not match the share code.
    Mismatch,
    /// No record exists for the share code.
    NotFound,
    /// An error summary we could not classify further.
    Problem,
}

impl SiteErrorKind {
    /// Message shown to the user.
    pub fn message(self) -> &'static str {
        match self {
            SiteErrorKind::Expired => "The share code has expired.",
            SiteErrorKind::Mismatch => "The details entered do not match the share code.",
            SiteErrorKind::NotFound => "No record was found for this share code.",
            SiteErrorKind::Problem => "The site reported a problem with the details entered.",
        }
    }
}

impl fmt::Display for SiteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteErrorKind::Expired => "expired",
            SiteErrorKind::Mismatch => "mismatch",
            SiteErrorKind::NotFound => "not_found",
            SiteErrorKind::Problem => "problem",
        };
        f.write_str(s)
    }
}

static RE_ERROR_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)class\s*=\s*["'][^"']*\berror-summary\b"#).unwrap());

static RE_NON_VISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>|<!--.*?-->").unwrap());

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static RE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Checked in order; the first kind with a matching phrase wins.
const PHRASES: &[(SiteErrorKind, &[&str])] = &[
    (
        SiteErrorKind::Expired,
        &["has expired", "code expired", "is no longer valid"],
    ),
    (
        SiteErrorKind::Mismatch,
        &[
            "do not match",
            "does not match",
            "details you entered",
            "check the details",
        ],
    ),
    (
        SiteErrorKind::NotFound,
        &[
            "not found",
            "could not find",
            "cannot find",
            "we could not find",
            "no record",
        ],
    ),
    (
        SiteErrorKind::Problem,
        &["there is a problem", "there was a problem"],
    ),
];

/// Visible text of an HTML page, lowercased and whitespace-collapsed.
pub fn visible_text(html: &str) -> String {
    let without_hidden = RE_NON_VISIBLE.replace_all(html, " ");
    let text = RE_TAG.replace_all(&without_hidden, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&rsquo;", "'")
        .replace("&amp;", "&");
    RE_SPACE.replace_all(text.trim(), " ").to_lowercase()
}

/// Classify the page's error summary, if it has one.
pub fn detect_site_error(html: &str) -> Option<(SiteErrorKind, String)> {
    if !RE_ERROR_SUMMARY.is_match(html) {
        return None;
    }
    let text = visible_text(html);
    PHRASES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(kind, _)| (*kind, kind.message().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_page(body: &str) -> String {
        format!(
            r#"<html><body><div class="govuk-error-summary" role="alert">
               <h2 class="govuk-error-summary__title">There is a problem</h2>
               <ul><li>{body}</li></ul></div></body></html>"#
        )
    }

    #[test]
    fn expired_code() {
        let (kind, msg) = detect_site_error(&error_page("This share code has expired")).unwrap();
        assert_eq!(kind, SiteErrorKind::Expired);
        assert!(msg.contains("expired"));
    }

    #[test]
    fn mismatch_beats_generic_problem() {
        let (kind, _) =
            detect_site_error(&error_page("The details you entered do not match our records")).unwrap();
        assert_eq!(kind, SiteErrorKind::Mismatch);
    }

    #[test]
    fn not_found() {
        let (kind, _) = detect_site_error(&error_page("We could not find a record")).unwrap();
        assert_eq!(kind, SiteErrorKind::NotFound);
    }

    #[test]
    fn generic_problem() {
        let (kind, _) = detect_site_error(&error_page("Enter a valid date")).unwrap();
        assert_eq!(kind, SiteErrorKind::Problem);
    }

    #[test]
    fn phrase_in_ordinary_copy_is_ignored() {
        let html = "<html><body><p>If the share code has expired, ask for a new one. \
                    There is a problem? Contact us.</p></body></html>";
        assert!(detect_site_error(html).is_none());
    }

    #[test]
    fn phrase_in_script_is_ignored() {
        let html = r#"<div class="error-summary"><p>Enter a date</p></div>
                      <script>var m = "has expired";</script>"#;
        assert!(detect_site_error(html).is_none());
    }

    #[test]
    fn visible_text_strips_markup() {
        assert_eq!(
            visible_text("<p>Date&nbsp;of <b>birth</b></p>\n<style>p{}</style>"),
            "date of birth"
        );
    }

    #[test]
    fn kind_display_matches_serde() {
        assert_eq!(SiteErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(serde_json::to_string(&SiteErrorKind::NotFound).unwrap(), "\"not_found\"");
    }
}
