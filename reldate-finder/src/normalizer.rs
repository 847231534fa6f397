//! Date Normalizer
//!
//! Canonicalizes free-text date strings into one comparable form so that
//! differently formatted strings describing the same calendar day compare equal.
//!
//! # Canonical form
//! Month name, day, year: `"March 3, 2023"`.
//!
//! # Fallback
//! Strings that do not parse as a full calendar date (month-only, year-only,
//! "TBA", free text) are returned unchanged. Two sources reporting the same
//! unparseable string therefore still agree.
//!
//! Pure and infallible: parse failure is not an error for the caller.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output rendering for parsed dates
const CANONICAL_FORMAT: &str = "%B %-d, %Y";

/// Accepted layouts, tried in order after cleanup (commas removed, ordinals stripped)
///
/// Slash dates are read month-first.
const DATE_FORMATS: &[&str] = &[
    "%B %d %Y",
    "%d %B %Y",
    "%Y-%m-%d",
    "%d-%B-%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
];

/// Canonical date string used as a grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedDate(String);

impl NormalizedDate {
    /// Borrow the canonical string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the canonical string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedDate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Free-text date canonicalizer
pub struct DateNormalizer;

impl DateNormalizer {
    /// Canonicalize `raw`, or return it unchanged if it is not a calendar date
    pub fn normalize(raw: &str) -> NormalizedDate {
        match parse_date(raw) {
            Some(date) => NormalizedDate(date.format(CANONICAL_FORMAT).to_string()),
            None => NormalizedDate(raw.to_string()),
        }
    }
}

/// Shorthand for [`DateNormalizer::normalize`]
pub fn normalize_date(raw: &str) -> NormalizedDate {
    DateNormalizer::normalize(raw)
}

/// Parse `raw` as a calendar date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }

    let cleaned = clean(trimmed);

    // Exactly day, month and year; otherwise "March 2023" reads as March 20, 0023
    let components = cleaned
        .split(|c: char| c.is_whitespace() || c == '-' || c == '/')
        .filter(|part| !part.is_empty())
        .count();
    if components != 3 {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
        .filter(|date| (1000..=9999).contains(&date.year()))
}

/// Remove commas and ordinal suffixes, fix "Sept", collapse whitespace
fn clean(raw: &str) -> String {
    raw.trim_end_matches('.')
        .replace(',', " ")
        .split_whitespace()
        .map(clean_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_token(token: &str) -> String {
    let token = token.trim_end_matches('.');
    let lower = token.to_ascii_lowercase();

    if lower == "sept" {
        return "Sep".to_string();
    }

    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(digits) = lower.strip_suffix(suffix) {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return digits.to_string();
            }
        }
    }

    token.to_string()
}
