//! Deterministic share-code and date-of-birth matchers over normalised text.
//!
//! Both matchers follow the same recipe: enumerate every regex candidate,
//! score each by how close it sits to a known label, and keep the best with
//! [`best_candidate`] (ties keep the earliest).
//!
//! ## Scoring
//!
//! | Field      | No label | < 80 chars | < 200 chars | further |
//! |------------|----------|------------|-------------|---------|
//! | Share code | 0.75     | 0.95       | 0.85        | 0.75    |
//! | DOB        | 0.50     | 0.95       | 0.85        | 0.65    |
//!
//! A value on the label's own line or the line right after it moves up from
//! the 200-character band to 0.95: passports print the date under its label.

use crate::fields::{expand_two_digit_year, DateOfBirth, ShareCode, MAX_YEAR, MIN_YEAR};
use crate::output::{best_candidate, ExtractionCandidate, Source};
use crate::pipeline::normalize::{fold_diacritics, NormalizedText};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Why a matcher produced no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miss {
    /// No share-code shaped token anywhere.
    NoShareCodeMatch,
    /// No date shape matched with valid components.
    NoDateMatch,
    /// Dates matched, but every one had a year outside 1900–2100.
    YearOutOfRange,
}

impl Miss {
    /// Reason tag reported in the result.
    pub fn reason(self) -> &'static str {
        match self {
            Miss::NoShareCodeMatch => "no_sharecode_match",
            Miss::NoDateMatch => "no_match",
            Miss::YearOutOfRange => "year_out_of_range",
        }
    }
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

pub type MatchResult<T> = Result<ExtractionCandidate<T>, Miss>;

// ── Label proximity ──────────────────────────────────────────────────────

pub const SHARE_CODE_LABELS: &[&str] = &["SHARE CODE"];

pub const DOB_LABELS: &[&str] = &["DATE OF BIRTH", "DATE DE NAISSANCE", "DOB"];

/// Confidence bands for one field.
#[derive(Debug, Clone, Copy)]
struct Bands {
    unlabelled: f32,
    near: f32,
    mid: f32,
    far: f32,
}

const SHARE_CODE_BANDS: Bands = Bands {
    unlabelled: 0.75,
    near: 0.95,
    mid: 0.85,
    far: 0.75,
};

const DOB_BANDS: Bands = Bands {
    unlabelled: 0.5,
    near: 0.95,
    mid: 0.85,
    far: 0.65,
};

const NEAR_CHARS: usize = 80;
const MID_CHARS: usize = 200;

/// First occurrence of each label in a text, by character offset and line.
struct LabelIndex<'a> {
    text: &'a NormalizedText,
    hits: Vec<(usize, usize)>,
}

impl<'a> LabelIndex<'a> {
    fn new(text: &'a NormalizedText, labels: &[&str]) -> Self {
        let hits = labels
            .iter()
            .filter_map(|label| text.as_str().find(label))
            .map(|byte| (text.char_offset(byte), text.line_of(byte)))
            .collect();
        Self { text, hits }
    }

    fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Score a match starting at byte `offset`.
    fn score(&self, offset: usize, bands: Bands) -> f32 {
        if self.hits.is_empty() {
            return bands.unlabelled;
        }
        let pos = self.text.char_offset(offset);
        let line = self.text.line_of(offset);

        self.hits
            .iter()
            .map(|&(label_pos, label_line)| {
                let distance = pos.abs_diff(label_pos);
                let adjacent = line == label_line || line == label_line + 1;
                if distance < NEAR_CHARS || (adjacent && distance < MID_CHARS) {
                    bands.near
                } else if distance < MID_CHARS {
                    bands.mid
                } else {
                    bands.far
                }
            })
            .fold(bands.far, f32::max)
    }
}

// ── Share code ───────────────────────────────────────────────────────────

static RE_SHARE_TRIPLETS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z0-9]{3})\s*([A-Z0-9]{3})\s*([A-Z0-9]{3})\b").unwrap()
});

static RE_SHARE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z0-9]{9}\b").unwrap());

/// Find the most plausible share code in `text`.
///
/// Triplet matches (`W7X 4PK 9QR`, `W7X4PK9QR`) are tried first; the bare
/// nine-character run only when no triplet matched at all.
pub fn match_share_code(text: &NormalizedText) -> MatchResult<ShareCode> {
    let t = text.as_str();

    let mut found: Vec<(ShareCode, usize)> = RE_SHARE_TRIPLETS
        .captures_iter(t)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let raw = format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
            ShareCode::parse(&raw).map(|code| (code, start))
        })
        .collect();

    if found.is_empty() {
        found = RE_SHARE_RUN
            .find_iter(t)
            .filter_map(|m| ShareCode::parse(m.as_str()).map(|code| (code, m.start())))
            .collect();
    }

    let labels = LabelIndex::new(text, SHARE_CODE_LABELS);
    let reason = if labels.is_empty() {
        "sharecode_match"
    } else {
        "near_share_code_label"
    };

    best_candidate(found.into_iter().map(|(code, start)| {
        ExtractionCandidate::new(
            code,
            labels.score(start, SHARE_CODE_BANDS),
            reason,
            Source::TextLayer,
        )
    }))
    .ok_or(Miss::NoShareCodeMatch)
}

// ── Date of birth ────────────────────────────────────────────────────────

static RE_DOB_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2})\.(\d{2})\.(\d{4})\b").unwrap());

static RE_DOB_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2})/(\d{2})/(\d{4})\b").unwrap());

/// `13 AUG 92`, `08 AUGUST 1992`, and the passport form `13 AUG /AOÛT 92`.
static RE_DOB_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s+(\p{Lu}{3,10})(?:\s*/\s*\p{Lu}{3,10})?\s+(\d{2,4})\b").unwrap()
});

/// Month number for an English or French month name, full or abbreviated.
///
/// Accents are ignored (`AOÛT` and `AOUT` both give 8).
pub fn month_from_name(name: &str) -> Option<u32> {
    let folded = fold_diacritics(&name.to_uppercase());
    let month = match folded.as_str() {
        "JAN" | "JANUARY" | "JANV" | "JANVIER" => 1,
        "FEB" | "FEBRUARY" | "FEV" | "FEVR" | "FEVRIER" => 2,
        "MAR" | "MARCH" | "MARS" => 3,
        "APR" | "APRIL" | "AVR" | "AVRIL" => 4,
        "MAY" | "MAI" => 5,
        "JUN" | "JUNE" | "JUIN" => 6,
        "JUL" | "JULY" | "JUIL" | "JUILLET" => 7,
        "AUG" | "AUGUST" | "AOUT" => 8,
        "SEP" | "SEPT" | "SEPTEMBER" | "SEPTEMBRE" => 9,
        "OCT" | "OCTOBER" | "OCTOBRE" => 10,
        "NOV" | "NOVEMBER" | "NOVEMBRE" => 11,
        "DEC" | "DECEMBER" | "DECEMBRE" => 12,
        _ => return None,
    };
    Some(month)
}

/// A date shape matched with in-range day and month.
struct DateHit {
    day: u32,
    month: u32,
    year: u32,
    start: usize,
    reason: String,
}

fn numeric_hits<'t>(
    re: &'static Regex,
    text: &'t str,
    reason: &'static str,
) -> impl Iterator<Item = DateHit> + 't {
    re.captures_iter(text).filter_map(move |caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: u32 = caps[3].parse().ok()?;
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return None;
        }
        Some(DateHit {
            day,
            month,
            year,
            start: caps.get(0)?.start(),
            reason: reason.to_string(),
        })
    })
}

fn word_hits(text: &str, reference_year: i32) -> impl Iterator<Item = DateHit> + '_ {
    RE_DOB_WORD.captures_iter(text).filter_map(move |caps| {
        let day: u32 = caps[1].parse().ok()?;
        let name = &caps[2];
        let month = month_from_name(name)?;
        let year: u32 = caps[3].parse().ok()?;
        if !(1..=31).contains(&day) {
            return None;
        }
        Some(DateHit {
            day,
            month,
            year: expand_two_digit_year(year, reference_year),
            start: caps.get(0)?.start(),
            reason: format!("word_month:{name}"),
        })
    })
}

/// Find the most plausible date of birth in `text`.
///
/// Shapes are enumerated dotted, then slashed, then word-month; on equal
/// confidence the earlier shape wins. Two-digit years are expanded against
/// `reference_year`. Dates whose year falls outside 1900–2100 are dropped
/// individually, so an in-range date elsewhere can still win.
pub fn match_date_of_birth(text: &NormalizedText, reference_year: i32) -> MatchResult<DateOfBirth> {
    let t = text.as_str();
    let labels = LabelIndex::new(text, DOB_LABELS);
    let mut out_of_range = false;

    let hits = numeric_hits(&RE_DOB_DOT, t, "dot_date")
        .chain(numeric_hits(&RE_DOB_SLASH, t, "slash_date"))
        .chain(word_hits(t, reference_year));

    let candidates: Vec<ExtractionCandidate<DateOfBirth>> = hits
        .filter_map(|hit| {
            if !(u32::from(MIN_YEAR)..=u32::from(MAX_YEAR)).contains(&hit.year) {
                out_of_range = true;
                return None;
            }
            let dob = DateOfBirth::new(hit.day, hit.month, hit.year)?;
            Some(ExtractionCandidate::new(
                dob,
                labels.score(hit.start, DOB_BANDS),
                hit.reason,
                Source::TextLayer,
            ))
        })
        .collect();

    best_candidate(candidates).ok_or(if out_of_range {
        Miss::YearOutOfRange
    } else {
        Miss::NoDateMatch
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2025;

    fn share(raw: &str) -> MatchResult<ShareCode> {
        match_share_code(&NormalizedText::new(raw))
    }

    fn dob(raw: &str) -> MatchResult<DateOfBirth> {
        match_date_of_birth(&NormalizedText::new(raw), YEAR)
    }

    // ── Share code ──

    #[test]
    fn share_code_next_to_label() {
        let c = share("Your share code is: w7x 4pk 9qr").unwrap();
        assert_eq!(c.value.as_str(), "W7X4PK9QR");
        assert_eq!(c.confidence, 0.95);
        assert_eq!(c.reason, "near_share_code_label");
        assert_eq!(c.source, Source::TextLayer);
    }

    #[test]
    fn share_code_without_label() {
        let c = share("Ref: W7X 4PK 9QR").unwrap();
        assert_eq!(c.value.as_str(), "W7X4PK9QR");
        assert_eq!(c.confidence, 0.75);
        assert_eq!(c.reason, "sharecode_match");
    }

    #[test]
    fn share_code_distance_bands() {
        let mid = format!("Share code\n{}W7X 4PK 9QR", "lorem ipsum\n".repeat(10));
        assert_eq!(share(&mid).unwrap().confidence, 0.85);

        let far = format!("Share code\n{}W7X 4PK 9QR", "lorem ipsum\n".repeat(30));
        assert_eq!(share(&far).unwrap().confidence, 0.75);
    }

    #[test]
    fn long_single_line_is_scored_by_distance() {
        let text = format!("Share code {}W7X 4PK 9QR", "lorem ipsum ".repeat(30));
        assert_eq!(share(&text).unwrap().confidence, 0.75);
    }

    #[test]
    fn next_line_lifts_mid_band() {
        let text = format!("Share code {}\nW7X 4PK 9QR", "lorem ipsum ".repeat(10));
        assert_eq!(share(&text).unwrap().confidence, 0.95);
    }

    #[test]
    fn share_code_on_line_after_label() {
        let text = format!("SHARE CODE\n{}\nnothing", "W7X 4PK 9QR");
        assert_eq!(share(&text).unwrap().confidence, 0.95);
    }

    #[test]
    fn share_code_closest_to_label_wins() {
        let text = format!(
            "AAA BBB CCC {} Share code: W7X 4PK 9QR",
            "filler text ".repeat(30)
        );
        let c = share(&text).unwrap();
        assert_eq!(c.value.as_str(), "W7X4PK9QR");
    }

    #[test]
    fn share_code_tie_keeps_first() {
        let c = share("AAA111BBB and CCC222DDD").unwrap();
        assert_eq!(c.value.as_str(), "AAA111BBB");
    }

    #[test]
    fn share_code_none() {
        assert_eq!(share("no code here").unwrap_err(), Miss::NoShareCodeMatch);
        assert_eq!(share("").unwrap_err().reason(), "no_sharecode_match");
    }

    // ── Date of birth ──

    #[test]
    fn labelled_word_month_two_digit_year() {
        let c = dob("DATE OF BIRTH: 13 AUG 92").unwrap();
        assert_eq!(c.value, DateOfBirth::new(13, 8, 1992).unwrap());
        assert!(c.confidence >= 0.85);
        assert_eq!(c.reason, "word_month:AUG");
    }

    #[test]
    fn unlabelled_slash_date_is_baseline() {
        let c = dob("03/06/1978").unwrap();
        assert_eq!(c.value.day_str(), "03");
        assert_eq!(c.value.month_str(), "06");
        assert_eq!(c.value.year_str(), "1978");
        assert_eq!(c.confidence, 0.5);
        assert_eq!(c.reason, "slash_date");
    }

    #[test]
    fn dotted_date() {
        let c = dob("Date de naissance 01.03.1986").unwrap();
        assert_eq!(c.value, DateOfBirth::new(1, 3, 1986).unwrap());
        assert_eq!(c.reason, "dot_date");
        assert_eq!(c.confidence, 0.95);
    }

    #[test]
    fn bilingual_passport_form() {
        let c = dob("Date of birth / Date de naissance\n13 AUG /AOÛT 92").unwrap();
        assert_eq!(c.value, DateOfBirth::new(13, 8, 1992).unwrap());
        assert_eq!(c.confidence, 0.95);
    }

    #[test]
    fn french_month_with_accent() {
        let c = dob("né le 8 février 1990").unwrap();
        assert_eq!(c.value, DateOfBirth::new(8, 2, 1990).unwrap());
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn unknown_month_name_is_ignored() {
        assert_eq!(dob("13 FOO 1992").unwrap_err(), Miss::NoDateMatch);
    }

    #[test]
    fn thirty_first_february_is_accepted() {
        let c = dob("DOB 31/02/1990").unwrap();
        assert_eq!(c.value, DateOfBirth::new(31, 2, 1990).unwrap());
    }

    #[test]
    fn invalid_components_are_skipped() {
        assert_eq!(dob("45/13/1990").unwrap_err(), Miss::NoDateMatch);
    }

    #[test]
    fn year_out_of_range_is_discarded() {
        let err = dob("DOB 01/01/1850").unwrap_err();
        assert_eq!(err, Miss::YearOutOfRange);
        assert_eq!(err.reason(), "year_out_of_range");
    }

    #[test]
    fn out_of_range_does_not_hide_valid_date() {
        let c = dob("Issued 01/01/2200 DOB 02/02/1980").unwrap();
        assert_eq!(c.value, DateOfBirth::new(2, 2, 1980).unwrap());
    }

    #[test]
    fn label_nearest_date_wins() {
        let text = format!(
            "Issued 01/01/2015 {} Date of birth 22/07/1985",
            "filler text ".repeat(30)
        );
        let c = dob(&text).unwrap();
        assert_eq!(c.value, DateOfBirth::new(22, 7, 1985).unwrap());
        assert_eq!(c.confidence, 0.95);
    }

    #[test]
    fn dot_shape_wins_tie_over_word_shape() {
        let c = dob("01.02.1990 and 3 MARCH 1991").unwrap();
        assert_eq!(c.reason, "dot_date");
    }

    #[test]
    fn month_table() {
        assert_eq!(month_from_name("sept"), Some(9));
        assert_eq!(month_from_name("DÉCEMBRE"), Some(12));
        assert_eq!(month_from_name("Juillet"), Some(7));
        assert_eq!(month_from_name("MAI"), Some(5));
        assert_eq!(month_from_name("XYZ"), None);
    }
}
