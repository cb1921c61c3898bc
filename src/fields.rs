//! Value types for the two fields this crate extracts.
//!
//! Both types can only be constructed through validating constructors, so a
//! `ShareCode` in hand is always nine `[A-Z0-9]` characters and a
//! `DateOfBirth` always has in-range components.
//!
//! Day/month pairing is deliberately *not* calendar-checked: `31/02/1990`
//! is a valid `DateOfBirth`. Callers that need a real calendar date must
//! check it themselves (the vision date parser does, see
//! [`crate::pipeline::vision::parse_lenient_date`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of characters in a canonical share code.
pub const SHARE_CODE_LEN: usize = 9;

/// Lowest year accepted for a date of birth.
pub const MIN_YEAR: u16 = 1900;

/// Highest year accepted for a date of birth.
pub const MAX_YEAR: u16 = 2100;

/// A UK Right to Work share code in canonical form (`W7X4PK9QR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShareCode(String);

impl ShareCode {
    /// Normalise a user- or document-supplied code.
    ///
    /// Uppercases, drops every character outside `[A-Z0-9]` (spaces, dashes,
    /// dots) and accepts the result only if exactly nine characters remain.
    pub fn parse(candidate: &str) -> Option<Self> {
        let raw: String = candidate
            .chars()
            .flat_map(char::to_uppercase)
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            .collect();
        if raw.len() == SHARE_CODE_LEN {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// The canonical nine characters, no separators.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form: three space-separated triplets (`W7X 4PK 9QR`).
    pub fn display(&self) -> String {
        format!("{} {} {}", &self.0[0..3], &self.0[3..6], &self.0[6..9])
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl FromStr for ShareCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("share code must be {SHARE_CODE_LEN} letters/digits (spaces optional), got {s:?}")
        })
    }
}

impl TryFrom<String> for ShareCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShareCode> for String {
    fn from(code: ShareCode) -> Self {
        code.0
    }
}

/// A date of birth with range-checked components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateOfBirth {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

impl DateOfBirth {
    /// Build a date, rejecting day ∉ 1..=31, month ∉ 1..=12 or
    /// year ∉ 1900..=2100.
    pub fn new(day: u32, month: u32, year: u32) -> Option<Self> {
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return None;
        }
        if !(MIN_YEAR as u32..=MAX_YEAR as u32).contains(&year) {
            return None;
        }
        Some(Self {
            day: day as u8,
            month: month as u8,
            year: year as u16,
        })
    }

    /// Parse separately supplied day/month/year strings (form input).
    ///
    /// Surrounding whitespace is ignored; the year must have four digits.
    pub fn from_parts(day: &str, month: &str, year: &str) -> Option<Self> {
        let (day, month, year) = (day.trim(), month.trim(), year.trim());
        if year.len() != 4 || day.is_empty() || month.is_empty() {
            return None;
        }
        Self::new(day.parse().ok()?, month.parse().ok()?, year.parse().ok()?)
    }

    /// Two-digit zero-padded day.
    pub fn day_str(&self) -> String {
        format!("{:02}", self.day)
    }

    /// Two-digit zero-padded month.
    pub fn month_str(&self) -> String {
        format!("{:02}", self.month)
    }

    /// Four-digit year.
    pub fn year_str(&self) -> String {
        format!("{:04}", self.year)
    }
}

impl fmt::Display for DateOfBirth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}/{:04}", self.day, self.month, self.year)
    }
}

impl FromStr for DateOfBirth {
    type Err = String;

    /// Accepts `DD/MM/YYYY`, `DD-MM-YYYY` or `DD.MM.YYYY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(['/', '-', '.']).collect();
        match parts.as_slice() {
            [d, m, y] => Self::from_parts(d, m, y)
                .ok_or_else(|| format!("date of birth out of range: {s:?}")),
            _ => Err(format!("expected DD/MM/YYYY, got {s:?}")),
        }
    }
}

/// Expand a two-digit year with a sliding window around `reference_year`.
///
/// Values greater than the reference year's last two digits land in the
/// 1900s, everything else in the 2000s. Four-digit input passes through.
///
/// The window moves with the calendar: in 2026 `26` means 2026 and `27`
/// means 1927. Birth years of the very young and very old near that
/// boundary are misclassified.
pub fn expand_two_digit_year(year: u32, reference_year: i32) -> u32 {
    if year >= 100 {
        return year;
    }
    let current = reference_year.rem_euclid(100) as u32;
    if year > current {
        1900 + year
    } else {
        2000 + year
    }
}
