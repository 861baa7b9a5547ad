//! Path helpers for server-relative resource paths.
//!
//! All functions operate on decoded paths. The normalised form of a path has no runs
//! of `/` and no trailing `/`, except the root `/` itself, so a collection `href` with
//! or without its trailing slash maps to the same key.
//!
//! # Examples
//!
//! ```
//! use webdav_http::protocol::urls::{join, normalize, relative_to};
//!
//! assert_eq!(normalize("/////foo////bar////"), "/foo/bar");
//! assert_eq!(join("/remote.php/dav", "files/"), "/remote.php/dav/files");
//! assert_eq!(relative_to("/remote.php/dav", "/remote.php/dav/files/admin"), "files/admin");
//! ```

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

fn slash_runs() -> &'static Regex {
    static SLASHES: OnceLock<Regex> = OnceLock::new();
    SLASHES.get_or_init(|| Regex::new("/{2,}").expect("static regex"))
}

/// Strip the trailing `/` of a path, except for the root.
pub fn strip_trailing_slash(path: &str) -> &str {
    if path.is_empty() || path == "/" {
        return path;
    }
    let stripped = path.trim_end_matches('/');
    if stripped.is_empty() {
        "/"
    } else {
        stripped
    }
}

/// Collapse runs of `/` and strip the trailing one.
pub fn normalize(path: &str) -> String {
    let collapsed = slash_runs().replace_all(path, "/");
    strip_trailing_slash(&collapsed).to_string()
}

/// Join `path` under `base`, producing a normalised absolute path.
pub fn join(base: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    normalize(&format!("/{}/{}", base, path))
}

/// Part of `candidate` below `base`.
///
/// Returns `/` when both name the same resource, and `candidate` (without surrounding
/// slashes) when `base` is the root.
pub fn relative_to(base: &str, candidate: &str) -> String {
    let base = base.trim_matches('/');
    let rel = candidate.trim_matches('/');

    if base == rel || rel.is_empty() {
        return "/".to_string();
    }
    if base.is_empty() {
        return rel.to_string();
    }

    match rel.strip_prefix(base).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => rest.to_string(),
        None => rel.to_string(),
    }
}

/// Decoded path component of a URL.
pub fn base_path(url: &Url) -> String {
    decode(url.path()).into_owned()
}

/// Join a resource path onto a base URL.
pub fn join_url(base_url: &Url, path: &str, add_trailing_slash: bool) -> Url {
    let mut joined = join(&base_path(base_url), path);
    if add_trailing_slash && !joined.ends_with('/') {
        joined.push('/');
    }
    let mut url = base_url.clone();
    url.set_path(&joined);
    url
}

/// Relative path of `rel` from the path of `base_url`.
pub fn relative_url_to(base_url: &Url, rel: &str) -> String {
    relative_to(&base_path(base_url), rel)
}

/// Decoded path of an `href`, which may be absolute (`https://host/a/b`) or a path.
pub fn href_path(href: &str) -> String {
    let href = href.trim();
    let path = match Url::parse(href) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    decode(&path).into_owned()
}

/// Whether an `href` is an absolute URL rather than a path.
pub fn is_absolute_url(href: &str) -> bool {
    Url::parse(href.trim()).map(|u| u.has_host()).unwrap_or(false)
}

fn decode(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let cases = [
            ("/", "/"),
            ("foo", "foo"),
            ("/foo", "/foo"),
            ("/foo/bar/", "/foo/bar"),
            ("/foo//bar//", "/foo/bar"),
            ("/////foo////bar////", "/foo/bar"),
            ("//", "/"),
            ("", ""),
        ];
        for (path, expected) in cases {
            assert_eq!(normalize(path), expected, "normalize({:?})", path);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let paths = ["", "/", "a", "//a//b//", "/a/b/c/", "a//", "///", "/x/./y/"];
        for path in paths {
            let once = normalize(path);
            assert_eq!(normalize(&once), once, "path {:?}", path);
        }
    }

    #[test]
    fn test_strip_trailing_slash() {
        assert_eq!(strip_trailing_slash(""), "");
        assert_eq!(strip_trailing_slash("/"), "/");
        assert_eq!(strip_trailing_slash("foo/bar/"), "foo/bar");
        assert_eq!(strip_trailing_slash("/foo/bar/"), "/foo/bar");
    }

    #[test]
    fn test_join() {
        let cases = [
            ("", "", "/"),
            ("", "/", "/"),
            ("/", "", "/"),
            ("", "foo", "/foo"),
            ("/", "/foo/", "/foo"),
            ("/foo", "bar", "/foo/bar"),
            ("foo/", "/bar/", "/foo/bar"),
            ("/foo/bar", "foobar/foobar", "/foo/bar/foobar/foobar"),
        ];
        for (base, path, expected) in cases {
            assert_eq!(join(base, path), expected, "join({:?}, {:?})", base, path);
        }
    }

    #[test]
    fn test_join_is_associative() {
        let bases = ["", "/", "/base", "base/", "/a/b/"];
        let segments = ["x", "x/", "/x", "x/y"];
        for base in bases {
            for a in segments {
                for b in segments {
                    assert_eq!(
                        join(&join(base, a), b),
                        join(base, &join(a, b)),
                        "base={:?} a={:?} b={:?}",
                        base,
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn test_relative_to() {
        let cases = [
            ("/foo", "foo", "/"),
            ("/foo/", "/foo/", "/"),
            ("/", "", "/"),
            ("", "/data/", "data"),
            ("/", "data", "data"),
            ("/foo", "/foo/bar/", "bar"),
            ("/foo/", "foo/bar", "bar"),
        ];
        for (base, rel, expected) in cases {
            assert_eq!(relative_to(base, rel), expected, "relative_to({:?}, {:?})", base, rel);
        }
    }

    #[test]
    fn test_join_url() {
        let base = Url::parse("https://example.org/foo/").unwrap();
        assert_eq!(join_url(&base, "/bar/", false).as_str(), "https://example.org/foo/bar");
        assert_eq!(join_url(&base, "", false).as_str(), "https://example.org/foo");
        assert_eq!(join_url(&base, "bar", true).as_str(), "https://example.org/foo/bar/");

        let root = Url::parse("https://example.org").unwrap();
        assert_eq!(join_url(&root, "/", false).as_str(), "https://example.org/");
    }

    #[test]
    fn test_join_url_encodes_spaces() {
        let base = Url::parse("https://example.org/dav").unwrap();
        let url = join_url(&base, "my file.txt", false);
        assert_eq!(url.path(), "/dav/my%20file.txt");
        assert_eq!(base_path(&url), "/dav/my file.txt");
    }

    #[test]
    fn test_relative_url_to() {
        let base = Url::parse("https://example.org/remote.php/dav").unwrap();
        assert_eq!(relative_url_to(&base, "/remote.php/dav/files/admin/dir"), "files/admin/dir");
        assert_eq!(relative_url_to(&base, "/remote.php/dav"), "/");
    }

    #[test]
    fn test_href_path() {
        assert_eq!(
            href_path("https://example.org/remote.php/dav/files/admin/dir/"),
            "/remote.php/dav/files/admin/dir/"
        );
        assert_eq!(href_path("/data/my%20file.txt"), "/data/my file.txt");
        assert!(is_absolute_url("https://example.org/a"));
        assert!(!is_absolute_url("/a"));
    }
}
