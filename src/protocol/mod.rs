//! WebDAV protocol primitives.
//!
//! Everything in here is pure: no I/O, no client state.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`urls`] | Path normalisation, joining and relative paths |
//! | [`headers`] | `Range`, `Content-Range`, `Depth`, `Overwrite` and `DAV` header helpers |
//! | [`dates`] | `creationdate` / `getlastmodified` parsing |
//! | [`multistatus`] | 207 Multi-Status parsing and PROPFIND request bodies |
//!
//! # References
//!
//! - [RFC 4918](https://datatracker.ietf.org/doc/html/rfc4918) (WebDAV)
//! - [RFC 9110 §14](https://datatracker.ietf.org/doc/html/rfc9110#section-14) (Range requests)

pub mod dates;
pub mod headers;
pub mod multistatus;
pub mod urls;

pub use headers::{
    format_range_header, parse_content_range, parse_dav_header, ContentRange, Depth,
};
pub use multistatus::{
    parse_multistatus_response, prepare_propfind_request_data, DavProperties, DavResponse,
    MultiStatusResponse, ResourceType,
};

/// Protocol constants.
pub mod constants {
    /// WebDAV method names.
    pub mod methods {
        use http::Method;

        /// PROPFIND (RFC 4918 §9.1)
        pub const PROPFIND: &str = "PROPFIND";
        /// PROPPATCH (RFC 4918 §9.2)
        pub const PROPPATCH: &str = "PROPPATCH";
        /// MKCOL (RFC 4918 §9.3)
        pub const MKCOL: &str = "MKCOL";
        /// COPY (RFC 4918 §9.8)
        pub const COPY: &str = "COPY";
        /// MOVE (RFC 4918 §9.9)
        pub const MOVE: &str = "MOVE";
        /// LOCK (RFC 4918 §9.10)
        pub const LOCK: &str = "LOCK";
        /// UNLOCK (RFC 4918 §9.11)
        pub const UNLOCK: &str = "UNLOCK";

        /// Build an extension method. The names above are valid tokens.
        pub fn method(name: &str) -> Method {
            Method::from_bytes(name.as_bytes()).unwrap_or(Method::GET)
        }
    }

    /// Header names used by the client.
    pub mod headers {
        use http::header::HeaderName;

        /// `Depth`
        pub const DEPTH: HeaderName = HeaderName::from_static("depth");
        /// `Destination`
        pub const DESTINATION: HeaderName = HeaderName::from_static("destination");
        /// `Overwrite`
        pub const OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
        /// `DAV`
        pub const DAV: HeaderName = HeaderName::from_static("dav");
    }

    /// Non-standard status used by Apache/cPanel hosting to throttle bandwidth.
    pub const BANDWIDTH_LIMIT_EXCEEDED: (u16, &str) = (509, "Bandwidth Limit Exceeded");

    /// XML namespace of all WebDAV properties.
    pub const DAV_NAMESPACE: &str = "DAV:";
}

/// Reason phrase for a status code.
///
/// Uses the canonical phrase, the 509 sentinel, then `fallback` (usually the text of the
/// status line).
pub fn reason_phrase(status: u16, fallback: Option<&str>) -> Option<String> {
    if status == constants::BANDWIDTH_LIMIT_EXCEEDED.0 {
        return Some(constants::BANDWIDTH_LIMIT_EXCEEDED.1.to_string());
    }
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .or_else(|| {
            fallback
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(423, None).as_deref(), Some("Locked"));
        assert_eq!(
            reason_phrase(509, None).as_deref(),
            Some("Bandwidth Limit Exceeded")
        );
        assert_eq!(reason_phrase(599, Some("Custom")).as_deref(), Some("Custom"));
        assert_eq!(reason_phrase(599, None), None);
    }

    #[test]
    fn test_extension_methods() {
        assert_eq!(constants::methods::method("PROPFIND").as_str(), "PROPFIND");
        assert_eq!(constants::methods::method("MKCOL").as_str(), "MKCOL");
    }
}
