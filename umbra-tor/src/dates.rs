//! Publish-date parsing for forum and blog markup
//!
//! Unparsable input yields `None`, never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// US before EU, so ambiguous `03/04/2024` reads as March 4th
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
];

const TEXT_PREFIXES: &[&str] = &["Posted on", "Date:", "Published:"];

/// Parse a date string against the supported formats
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_rfc822(input)
}

/// `02 Jan 06 15:04 MST`; zone abbreviations are read as UTC
fn parse_rfc822(input: &str) -> Option<DateTime<Utc>> {
    let (head, zone) = input.rsplit_once(' ')?;
    if !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    NaiveDateTime::parse_from_str(head, "%d %b %y %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Strip a "Posted on" / "Date:" / "Published:" label, then parse
pub fn extract_date_from_text(text: &str) -> Option<DateTime<Utc>> {
    let mut text = text.trim();
    for prefix in TEXT_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim();
        }
    }
    parse_date(text)
}
