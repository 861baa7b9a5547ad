//! 207 Multi-Status parsing.
//!
//! A multistatus body holds one `<DAV:response>` per resource. Each becomes a
//! [`DavResponse`] keyed by its normalised path, so the caller can look a resource up
//! regardless of whether the server reported a collection with a trailing slash.
//!
//! ```text
//! <d:multistatus xmlns:d="DAV:">
//!   <d:response>
//!     <d:href>/dav/file.txt</d:href>            -> key "/dav/file.txt"
//!     <d:propstat>
//!       <d:prop>...</d:prop>                    -> DavProperties
//!       <d:status>HTTP/1.1 200 OK</d:status>
//!     </d:propstat>
//!   </d:response>
//!   <d:response>
//!     <d:href>/dav/locked/</d:href>             -> key "/dav/locked"
//!     <d:status>HTTP/1.1 423 Locked</d:status>  -> status_code 423
//!   </d:response>
//! </d:multistatus>
//! ```
//!
//! # Examples
//!
//! ```
//! use webdav_http::protocol::MultiStatusResponse;
//!
//! let body = r#"<d:multistatus xmlns:d="DAV:">
//!   <d:response>
//!     <d:href>/dav/dir/</d:href>
//!     <d:propstat>
//!       <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
//!       <d:status>HTTP/1.1 200 OK</d:status>
//!     </d:propstat>
//!   </d:response>
//! </d:multistatus>"#;
//!
//! let multistatus = MultiStatusResponse::parse(body).unwrap();
//! let response = multistatus.get_response_for_path("/dav", "dir").unwrap();
//! assert_eq!(response.properties.collection, Some(true));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, MultiStatusResponseError, ParseError};
use crate::protocol::constants::DAV_NAMESPACE;
use crate::protocol::{dates, reason_phrase, urls};

/// Library property names and the DAV property each one maps to.
pub const MAPPING_PROPS: &[(&str, &str)] = &[
    ("content_length", "getcontentlength"),
    ("etag", "getetag"),
    ("created", "creationdate"),
    ("modified", "getlastmodified"),
    ("content_language", "getcontentlanguage"),
    ("content_type", "getcontenttype"),
    ("display_name", "displayname"),
];

/// DAV property name for a library name, if it is one of the known ones.
pub fn dav_property_name(name: &str) -> Option<&'static str> {
    MAPPING_PROPS
        .iter()
        .find(|(library, _)| *library == name)
        .map(|(_, dav)| *dav)
}

/// Whether a resource is a plain file or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Non-collection resource.
    File,
    /// Collection.
    Directory,
}

impl ResourceType {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::File => "file",
            ResourceType::Directory => "directory",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal namespace-resolved element tree built from the body.
#[derive(Debug, Default, Clone)]
struct Element {
    dav: bool,
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn is(&self, name: &str) -> bool {
        self.dav && self.name == name
    }

    /// Direct DAV child.
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(name))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// First DAV descendant in document order.
    fn find(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find_map(|c| if c.is(name) { Some(c) } else { c.find(name) })
    }

    fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.is(name) {
                out.push(child);
            } else {
                child.find_all(name, out);
            }
        }
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|e| e.text.clone())
    }
}

fn parse_tree(body: &str) -> Result<Option<Element>, ParseError> {
    let mut reader = NsReader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        let in_dav = matches!(ns, ResolveResult::Bound(ns) if ns.as_ref() == DAV_NAMESPACE.as_bytes());

        match event {
            Event::Start(start) => stack.push(Element {
                dav: in_dav,
                name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Event::Empty(start) => {
                let element = Element {
                    dav: in_dav,
                    name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                    ..Default::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }
    Ok(root)
}

/// Known DAV properties of one resource.
///
/// Fields are `None` when the server did not report the property, or reported it
/// inside a `<propstat>` with a non-2xx status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DavProperties {
    /// `getcontentlength`
    pub content_length: Option<u64>,
    /// `getetag`, `None` when empty.
    pub etag: Option<String>,
    /// `creationdate`
    pub created: Option<DateTime<FixedOffset>>,
    /// `getlastmodified`
    pub modified: Option<DateTime<FixedOffset>>,
    /// `getcontenttype`
    pub content_type: Option<String>,
    /// `getcontentlanguage`
    pub content_language: Option<String>,
    /// `displayname`
    pub display_name: Option<String>,
    /// Whether `resourcetype` contains `collection`; `None` without `resourcetype`.
    pub collection: Option<bool>,
    /// Derived from [`collection`](Self::collection).
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
    /// Text of each known property as received, keyed by library name.
    #[serde(skip)]
    pub raw: BTreeMap<&'static str, Option<String>>,
}

impl DavProperties {
    fn from_response(response: &Element) -> Self {
        let props: Vec<&Element> = response
            .children_named("propstat")
            .filter(|propstat| propstat_succeeded(propstat))
            .collect();

        let find = |name: &str| props.iter().find_map(|propstat| propstat.find(name));

        let mut raw = BTreeMap::new();
        for (library, dav) in MAPPING_PROPS {
            raw.insert(*library, find(*dav).map(|e| e.text.clone()));
        }
        let text = |library: &str| raw.get(library).cloned().flatten();

        let content_length = text("content_length")
            .filter(|v| !v.is_empty())
            .and_then(|v| match v.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!("Ignoring invalid getcontentlength {:?}", v);
                    None
                }
            });

        let created = text("created")
            .filter(|v| !v.is_empty())
            .and_then(|v| parse_date(&v, "creationdate", dates::parse_iso8601));
        let modified = text("modified")
            .filter(|v| !v.is_empty())
            .and_then(|v| parse_date(&v, "getlastmodified", dates::parse_rfc1123));

        let collection = find("resourcetype").map(|rt| rt.find("collection").is_some());
        let resource_type = collection.map(|is_dir| {
            if is_dir {
                ResourceType::Directory
            } else {
                ResourceType::File
            }
        });

        let etag = text("etag").filter(|v| !v.is_empty());
        let content_type = text("content_type");
        let content_language = text("content_language");
        let display_name = text("display_name");

        DavProperties {
            content_length,
            etag,
            created,
            modified,
            content_type,
            content_language,
            display_name,
            collection,
            resource_type,
            raw,
        }
    }

    /// Whether the resource is a collection.
    pub fn is_collection(&self) -> bool {
        self.collection.unwrap_or(false)
    }
}

fn parse_date(
    value: &str,
    property: &str,
    parse: fn(&str) -> Option<DateTime<FixedOffset>>,
) -> Option<DateTime<FixedOffset>> {
    let parsed = parse(value);
    if parsed.is_none() {
        warn!("Ignoring unparseable {} {:?}", property, value);
    }
    parsed
}

fn propstat_succeeded(propstat: &Element) -> bool {
    match propstat.child_text("status").as_deref().map(parse_status_line) {
        Some(Ok(Some(code))) => (200..300).contains(&code),
        Some(Err(_)) => false,
        _ => true,
    }
}

/// Code of a `HTTP/1.1 423 Locked` status line. Empty lines have no code.
fn parse_status_line(line: &str) -> Result<Option<u16>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .map(Some)
        .ok_or_else(|| ParseError::InvalidStatus(line.to_string()))
}

/// One `<response>` of a multistatus body.
#[derive(Debug, Clone, PartialEq)]
pub struct DavResponse {
    /// `href` as received.
    pub href: String,
    /// Whether the `href` was an absolute URL.
    pub is_href_absolute: bool,
    /// Decoded path of the `href`; collections may end in `/`.
    pub path: String,
    /// `path` without its trailing slash. Used as the key.
    pub path_norm: String,
    /// Code of the direct `<status>` child.
    pub status_code: Option<u16>,
    /// Reason phrase for [`status_code`](Self::status_code).
    pub reason_phrase: Option<String>,
    /// `responsedescription`
    pub response_description: Option<String>,
    /// Text of `<error>`.
    pub error: Option<String>,
    /// `href` inside `<location>`.
    pub location: Option<String>,
    /// Whether the response carried any `<propstat>`.
    pub has_propstat: bool,
    /// Known properties.
    pub properties: DavProperties,
}

impl DavResponse {
    fn from_element(element: &Element) -> Result<Self, ParseError> {
        let href = element
            .child_text("href")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or(ParseError::MissingHref)?;

        let path = urls::href_path(&href);
        let path_norm = urls::normalize(&path);

        let status_line = element.child_text("status");
        let status_code = match status_line.as_deref() {
            Some(line) => parse_status_line(line)?,
            None => None,
        };
        let reason_phrase = status_code.and_then(|code| {
            let fallback = status_line
                .as_deref()
                .and_then(|line| line.trim().splitn(3, char::is_whitespace).nth(2));
            reason_phrase(code, fallback)
        });

        let location = element
            .child("location")
            .map(|loc| match loc.child("href") {
                Some(href) => href.text.clone(),
                None => loc.text.clone(),
            });

        Ok(DavResponse {
            is_href_absolute: urls::is_absolute_url(&href),
            href,
            path,
            path_norm,
            status_code,
            reason_phrase,
            response_description: element.child_text("responsedescription"),
            error: element.child_text("error"),
            location,
            has_propstat: element.child("propstat").is_some(),
            properties: DavProperties::from_response(element),
        })
    }

    /// Path of the resource relative to `base_url`.
    pub fn path_relative_to(&self, base_url: &Url) -> String {
        urls::relative_url_to(base_url, &self.path_norm)
    }

    /// Whether the response status is an error (4xx or 5xx).
    pub fn is_error(&self) -> bool {
        matches!(self.status_code, Some(400..=599))
    }
}

impl fmt::Display for DavResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response: {}", self.path_norm)
    }
}

/// Parsed 207 body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiStatusResponse {
    /// Records keyed by normalised path.
    pub responses: BTreeMap<String, DavResponse>,
    /// Top-level `responsedescription`.
    pub response_description: Option<String>,
}

impl MultiStatusResponse {
    /// Parse a multistatus body.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let Some(root) = parse_tree(body)? else {
            return Ok(Self::default());
        };

        let mut elements = Vec::new();
        if root.is("response") {
            elements.push(&root);
        } else {
            root.find_all("response", &mut elements);
        }

        let mut responses = BTreeMap::new();
        for element in elements {
            let response = DavResponse::from_element(element)?;
            if let Some(previous) = responses.insert(response.path_norm.clone(), response) {
                debug!(
                    "Duplicate response for {} in multistatus body; keeping the last one",
                    previous.path_norm
                );
            }
        }

        Ok(MultiStatusResponse {
            responses,
            response_description: root.child_text("responsedescription"),
        })
    }

    /// Record for `path` joined under `hostname` (the path of the base URL).
    pub fn get_response_for_path(
        &self,
        hostname: &str,
        path: &str,
    ) -> Result<&DavResponse, ClientError> {
        let key = urls::join(hostname, path);
        self.responses
            .get(&key)
            .ok_or(ClientError::MissingResponse { path: key })
    }

    /// Fail with every record whose status is 4xx/5xx, keyed by raw `href`.
    pub fn raise_for_status(&self) -> Result<(), MultiStatusResponseError> {
        let statuses: BTreeMap<String, String> = self
            .responses
            .values()
            .filter(|r| r.is_error())
            .map(|r| {
                let reason = r
                    .reason_phrase
                    .clone()
                    .or_else(|| r.status_code.map(|code| code.to_string()))
                    .unwrap_or_default();
                (r.href.clone(), reason)
            })
            .collect();

        if statuses.is_empty() {
            Ok(())
        } else {
            Err(MultiStatusResponseError::new(statuses))
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Whether the body held no records.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// PROPFIND body requesting a single property.
///
/// Returns `None` without a name, which the client sends as an empty body (allprop).
/// Known library names (`created`, `content_length`, ...) are mapped to their DAV
/// names; anything else is sent as-is.
pub fn prepare_propfind_request_data(name: Option<&str>, namespace: Option<&str>) -> Option<String> {
    let name = name.filter(|n| !n.is_empty())?;
    let name = dav_property_name(name).unwrap_or(name);
    let element = match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("<{} xmlns=\"{}\"/>", name, escape(ns)),
        None => format!("<{}/>", name),
    };
    Some(format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><propfind xmlns=\"{}\"><prop>{}</prop></propfind>",
        DAV_NAMESPACE, element
    ))
}

/// Parse the body of a response that must be 207 Multi-Status.
pub fn parse_multistatus_response(status: u16, body: &str) -> Result<MultiStatusResponse, ParseError> {
    if status != 207 {
        return Err(ParseError::NotMultiStatus(status));
    }
    MultiStatusResponse::parse(body)
}
