//! Header parsing and formatting for WebDAV requests.
//!
//! # Header Formats
//!
//! | Header | Format | Example |
//! |--------|--------|---------|
//! | Range | `bytes={start}-` | `bytes=1024-` |
//! | Content-Range | `bytes {first}-{last}/{total}` | `bytes 1024-2047/4096` |
//! | Accept-Ranges | token | `bytes` |
//! | Depth | `0`, `1` or `infinity` | `1` |
//! | Overwrite | `T` or `F` | `F` |
//! | DAV | comma-separated compliance classes | `1, 2, access-control` |
//!
//! # Examples
//!
//! ```
//! use webdav_http::protocol::{format_range_header, parse_content_range, Depth};
//!
//! assert_eq!(format_range_header(1024), "bytes=1024-");
//!
//! let range = parse_content_range("bytes 1024-2047/4096").unwrap();
//! assert_eq!(range.start, Some(1024));
//! assert_eq!(range.total, Some(4096));
//!
//! assert_eq!(Depth::Infinity.to_string(), "infinity");
//! ```

use std::collections::BTreeSet;
use std::fmt;

/// `Depth` header value (RFC 4918 §10.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Depth {
    /// The resource only.
    Zero,
    /// The resource and its immediate members.
    One,
    /// The resource and all descendants.
    #[default]
    Infinity,
}

impl Depth {
    /// Header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `Content-Range` of a 206 response.
///
/// `start`/`end` are `None` for the unsatisfied form `bytes */{total}`; `total` is
/// `None` when the server sent `*` as the complete length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte position.
    pub start: Option<u64>,
    /// Last byte position (inclusive).
    pub end: Option<u64>,
    /// Complete length of the representation.
    pub total: Option<u64>,
}

/// Format the open-ended `Range` header used to resume a download.
///
/// # Examples
///
/// ```
/// use webdav_http::protocol::format_range_header;
///
/// assert_eq!(format_range_header(0), "bytes=0-");
/// assert_eq!(format_range_header(42), "bytes=42-");
/// ```
#[inline]
pub fn format_range_header(start: u64) -> String {
    format!("bytes={}-", start)
}

/// Parse a `Content-Range` header.
///
/// Returns `None` for units other than `bytes` or malformed values.
///
/// # Examples
///
/// ```
/// use webdav_http::protocol::parse_content_range;
///
/// let range = parse_content_range("bytes 0-99/200").unwrap();
/// assert_eq!((range.start, range.end, range.total), (Some(0), Some(99), Some(200)));
///
/// let unsatisfied = parse_content_range("bytes */200").unwrap();
/// assert_eq!(unsatisfied.start, None);
/// assert_eq!(unsatisfied.total, Some(200));
///
/// assert!(parse_content_range("items 0-1/2").is_none());
/// ```
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (range, total) = rest.trim().split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };

    let (start, end) = match range.trim() {
        "*" => (None, None),
        r => {
            let (first, last) = r.split_once('-')?;
            let first: u64 = first.trim().parse().ok()?;
            let last: u64 = last.trim().parse().ok()?;
            if last < first {
                return None;
            }
            (Some(first), Some(last))
        }
    };

    Some(ContentRange { start, end, total })
}

/// Whether an `Accept-Ranges` value advertises byte ranges.
pub fn accepts_byte_ranges(value: Option<&str>) -> bool {
    value
        .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
        .unwrap_or(false)
}

/// `Overwrite` header value.
#[inline]
pub fn overwrite_header(overwrite: bool) -> &'static str {
    if overwrite {
        "T"
    } else {
        "F"
    }
}

/// Parse the compliance classes of a `DAV` header.
///
/// # Examples
///
/// ```
/// use webdav_http::protocol::parse_dav_header;
///
/// let classes = parse_dav_header("1, 2, access-control");
/// assert!(classes.contains("2"));
/// assert_eq!(classes.len(), 3);
/// ```
pub fn parse_dav_header(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|class| !class.is_empty())
        .map(str::to_string)
        .collect()
}

/// Charset parameter of a `Content-Type` value.
pub fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_values() {
        assert_eq!(Depth::Zero.as_str(), "0");
        assert_eq!(Depth::One.to_string(), "1");
        assert_eq!(Depth::default(), Depth::Infinity);
    }

    #[test]
    fn test_parse_content_range() {
        let range = parse_content_range("bytes 10-19/20").unwrap();
        assert_eq!(range.start, Some(10));
        assert_eq!(range.end, Some(19));
        assert_eq!(range.total, Some(20));
    }

    #[test]
    fn test_parse_content_range_unknown_total() {
        let range = parse_content_range("bytes 0-9/*").unwrap();
        assert_eq!(range.total, None);
    }

    #[test]
    fn test_parse_content_range_invalid() {
        assert!(parse_content_range("invalid").is_none());
        assert!(parse_content_range("bytes 9-0/10").is_none());
        assert!(parse_content_range("bytes a-b/10").is_none());
    }

    #[test]
    fn test_accepts_byte_ranges() {
        assert!(accepts_byte_ranges(Some("bytes")));
        assert!(accepts_byte_ranges(Some("none, Bytes")));
        assert!(!accepts_byte_ranges(Some("none")));
        assert!(!accepts_byte_ranges(None));
    }

    #[test]
    fn test_overwrite_header() {
        assert_eq!(overwrite_header(true), "T");
        assert_eq!(overwrite_header(false), "F");
    }

    #[test]
    fn test_parse_dav_header_empty() {
        assert!(parse_dav_header("").is_empty());
    }

    #[test]
    fn test_charset() {
        assert_eq!(
            charset("text/plain; charset=\"UTF-8\"").as_deref(),
            Some("utf-8")
        );
        assert_eq!(charset("application/octet-stream"), None);
    }
}
