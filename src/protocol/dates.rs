//! Date parsing for `creationdate` and `getlastmodified`.
//!
//! `creationdate` is ISO-8601 and `getlastmodified` is RFC-1123, but servers in the
//! wild send unpadded fields, a wrong weekday, numeric offsets or `date(1)` output.
//! Both parsers try the expected format first and then fall back to the other
//! known layouts. Values without an offset are taken as UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%d %b %Y %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%d-%b-%y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

/// Parse an ISO-8601 timestamp (`creationdate`).
pub fn parse_iso8601(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .ok()
        .or_else(|| parse_permissive(value))
}

/// Parse an RFC-1123 timestamp (`getlastmodified`).
pub fn parse_rfc1123(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .ok()
        .or_else(|| parse_permissive(value))
}

fn parse_permissive(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Some(dt) = parse_with_formats(value) {
        return Some(dt);
    }

    // The weekday is redundant and frequently inconsistent with the date.
    let without_weekday = strip_weekday(value);
    if without_weekday != value {
        if let Ok(dt) = DateTime::parse_from_rfc2822(without_weekday) {
            return Some(dt);
        }
        return parse_with_formats(without_weekday);
    }
    None
}

fn parse_with_formats(value: &str) -> Option<DateTime<FixedOffset>> {
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    let naive = strip_utc_designators(value);
    NAIVE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(&naive, format)
            .ok()
            .map(|dt| dt.and_utc().fixed_offset())
    })
}

fn strip_weekday(value: &str) -> &str {
    let value = value.trim_start();
    let end = value
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    if end == 0 || end == value.len() {
        return value;
    }
    // A month name is followed by a day, a weekday by a comma or the month name.
    let rest = &value[end..];
    let next = rest.trim_start_matches([',', ' ']);
    if next.starts_with(|c: char| c.is_ascii_alphabetic()) || rest.starts_with(',') {
        next
    } else {
        value
    }
}

fn strip_utc_designators(value: &str) -> String {
    let value = value.strip_suffix('Z').unwrap_or(value);
    value
        .split_whitespace()
        .filter(|token| !matches!(*token, "UTC" | "GMT" | "Z"))
        .collect::<Vec<_>>()
        .join(" ")
}
