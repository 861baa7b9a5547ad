//! In-memory WebDAV server for tests.
//!
//! [`MemoryServer`] implements [`Transport`] directly, so a [`WebdavClient`] can talk
//! to it without sockets. It keeps a tree of files and collections and answers the
//! verbs the client uses with the statuses a real server would send, including
//! `Range` requests, `Depth`, `Overwrite`, locks and 207 partial failures.
//!
//! Failures can be injected: error statuses or refused connections for the next
//! requests, and GET bodies that break after the first chunk (or before it).
//!
//! ```ignore
//! use std::sync::Arc;
//! use webdav_http::testing::MemoryServer;
//!
//! # tokio_test::block_on(async {
//! let server = Arc::new(MemoryServer::new("/dav"));
//! server.insert_file("data/foo", "foo");
//! let client = server.client();
//! assert_eq!(client.content_length("data/foo").await.unwrap(), Some(3));
//! # });
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{
    HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG,
    RANGE,
};
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use quick_xml::escape::escape;
use url::Url;

use crate::client::transport::{HttpRequest, HttpResponse, Transport};
use crate::client::{ClientConfig, WebdavClient};
use crate::error::TransportError;
use crate::protocol::urls;

/// How GET bodies misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFailure {
    /// Bodies are delivered in full.
    #[default]
    None,
    /// The connection drops after the first chunk of every GET body.
    AfterFirstChunk,
    /// Like `AfterFirstChunk`, for the next GET only.
    OnceAfterFirstChunk,
    /// The connection drops before any byte of every GET body.
    BeforeFirstChunk,
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Decoded, normalised URL path.
    pub path: String,
    pub headers: HeaderMap,
}

enum Injected {
    Status(u16),
    Refused,
}

struct Node {
    /// `None` for collections.
    data: Option<Bytes>,
    etag: String,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl Node {
    fn dir() -> Self {
        let now = Utc::now();
        Node {
            data: None,
            etag: String::new(),
            created: now,
            modified: now,
        }
    }

    fn is_dir(&self) -> bool {
        self.data.is_none()
    }

    fn copy(&self) -> Self {
        Node {
            data: self.data.clone(),
            etag: self.etag.clone(),
            created: Utc::now(),
            modified: self.modified,
        }
    }
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    locked: BTreeSet<String>,
    requests: Vec<RecordedRequest>,
    injected: VecDeque<Injected>,
    version: u64,
}

impl State {
    fn is_dir(&self, path: &str) -> bool {
        self.nodes.get(path).is_some_and(Node::is_dir)
    }

    fn subtree(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|candidate| *candidate == path || is_below(path, candidate, false))
            .cloned()
            .collect()
    }

    fn remove_subtree(&mut self, path: &str) {
        for key in self.subtree(path) {
            self.nodes.remove(&key);
        }
    }
}

fn is_below(parent: &str, candidate: &str, direct_only: bool) -> bool {
    let prefix = if parent == "/" {
        "/".to_string()
    } else {
        format!("{}/", parent)
    };
    match candidate.strip_prefix(&prefix) {
        Some(rest) if !rest.is_empty() => !direct_only || !rest.contains('/'),
        _ => false,
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((head, _)) => head.to_string(),
    }
}

fn encode_href(path: &str, is_dir: bool) -> String {
    let mut href = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if is_dir && !href.ends_with('/') {
        href.push('/');
    }
    href
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn empty(status: u16) -> HttpResponse {
    respond(status, HeaderMap::new(), Bytes::new())
}

fn respond(status: u16, headers: HeaderMap, body: Bytes) -> HttpResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::from_bytes(status, headers, body)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn multistatus(responses: &str) -> HttpResponse {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><d:multistatus xmlns:d=\"DAV:\">{}</d:multistatus>",
        responses
    );
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml; charset=utf-8"));
    respond(207, headers, Bytes::from(body))
}

fn prop_response(path: &str, node: &Node) -> String {
    let name = path.rsplit('/').next().unwrap_or_default();
    let mut props = format!(
        "<d:displayname>{}</d:displayname><d:creationdate>{}</d:creationdate><d:getlastmodified>{}</d:getlastmodified>",
        escape(name),
        node.created.to_rfc3339(),
        node.modified.to_rfc2822()
    );
    match &node.data {
        None => props.push_str("<d:resourcetype><d:collection/></d:resourcetype>"),
        Some(data) => {
            props.push_str(&format!(
                "<d:resourcetype/><d:getcontentlength>{}</d:getcontentlength><d:getetag>{}</d:getetag><d:getcontenttype>{}</d:getcontenttype>",
                data.len(),
                escape(&node.etag),
                content_type_for(path)
            ));
        }
    }
    format!(
        "<d:response><d:href>{}</d:href><d:propstat><d:prop>{}</d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
        encode_href(path, node.is_dir()),
        props
    )
}

fn parse_range_start(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

/// In-memory WebDAV server.
pub struct MemoryServer {
    root: String,
    state: Mutex<State>,
    accept_ranges: AtomicBool,
    honour_ranges: AtomicBool,
    chunk_size: AtomicUsize,
    body_failure: Mutex<BodyFailure>,
}

impl MemoryServer {
    /// Empty server whose collection root is `root` (for example `/dav`).
    pub fn new(root: &str) -> Self {
        let root = urls::normalize(&format!("/{}", root));
        let mut state = State::default();
        state.nodes.insert(root.clone(), Node::dir());
        MemoryServer {
            root,
            state: Mutex::new(state),
            accept_ranges: AtomicBool::new(true),
            honour_ranges: AtomicBool::new(true),
            chunk_size: AtomicUsize::new(8192),
            body_failure: Mutex::new(BodyFailure::None),
        }
    }

    /// Base URL of the root collection.
    pub fn base_url(&self) -> String {
        format!("http://webdav.test{}/", self.root.trim_end_matches('/'))
    }

    /// Client for this server without retry delays.
    pub fn client(self: &Arc<Self>) -> WebdavClient {
        self.client_with(ClientConfig {
            retry_delay_ms: 0,
            ..Default::default()
        })
    }

    /// Client for this server with a custom configuration.
    pub fn client_with(self: &Arc<Self>, config: ClientConfig) -> WebdavClient {
        WebdavClient::with_transport(&self.base_url(), config, self.clone())
            .expect("memory server base url is valid")
    }

    /// Advertise and honour byte ranges, or neither.
    pub fn set_ranges(&self, enabled: bool) {
        self.accept_ranges.store(enabled, Ordering::SeqCst);
        self.honour_ranges.store(enabled, Ordering::SeqCst);
    }

    /// Keep advertising `Accept-Ranges` but answer every GET with the full body.
    pub fn set_honour_ranges(&self, enabled: bool) {
        self.honour_ranges.store(enabled, Ordering::SeqCst);
    }

    /// Size of the chunks GET bodies are delivered in.
    pub fn set_chunk_size(&self, chunk_size: usize) {
        self.chunk_size.store(chunk_size.max(1), Ordering::SeqCst);
    }

    pub fn set_body_failure(&self, failure: BodyFailure) {
        *self.body_failure.lock() = failure;
    }

    /// Answer the next `times` requests with `status` and an empty body.
    pub fn fail_next(&self, status: u16, times: usize) {
        let mut state = self.state.lock();
        state.injected.extend((0..times).map(|_| Injected::Status(status)));
    }

    /// Refuse the next `times` connections with a network error.
    pub fn refuse_next(&self, times: usize) {
        let mut state = self.state.lock();
        state.injected.extend((0..times).map(|_| Injected::Refused));
    }

    fn key(&self, path: &str) -> String {
        urls::join(&self.root, path)
    }

    /// Store a file at `path` (relative to the root), creating missing collections.
    pub fn insert_file(&self, path: &str, data: impl Into<Bytes>) {
        let key = self.key(path);
        let mut state = self.state.lock();
        let mut parent = parent_of(&key);
        while parent.len() > self.root.len() && !state.nodes.contains_key(&parent) {
            state.nodes.insert(parent.clone(), Node::dir());
            parent = parent_of(&parent);
        }
        state.version += 1;
        let now = Utc::now();
        let node = Node {
            etag: format!("\"{}\"", state.version),
            data: Some(data.into()),
            created: now,
            modified: now,
        };
        state.nodes.insert(key, node);
    }

    /// Create a collection at `path`, with its ancestors.
    pub fn insert_dir(&self, path: &str) {
        let key = self.key(path);
        let mut state = self.state.lock();
        let mut current = key;
        while current.len() > self.root.len() && !state.nodes.contains_key(&current) {
            state.nodes.insert(current.clone(), Node::dir());
            current = parent_of(&current);
        }
    }

    /// Content of the file at `path`.
    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.state.lock().nodes.get(&self.key(path)).and_then(|n| n.data.clone())
    }

    /// Whether anything exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(&self.key(path))
    }

    /// Lock `path` so that writes to it fail with 423.
    pub fn lock(&self, path: &str) {
        let key = self.key(path);
        self.state.lock().locked.insert(key);
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests seen with `method`.
    pub fn request_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method.as_str() == method)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    fn options(&self) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("dav"), HeaderValue::from_static("1, 2"));
        if self.accept_ranges.load(Ordering::SeqCst) {
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }
        respond(200, headers, Bytes::new())
    }

    fn propfind(&self, path: &str, headers: &HeaderMap) -> HttpResponse {
        let depth = header_str(headers, "depth").unwrap_or("infinity");
        let state = self.state.lock();
        let Some(node) = state.nodes.get(path) else {
            return empty(404);
        };

        let mut body = prop_response(path, node);
        if node.is_dir() && depth != "0" {
            for (child, node) in state.nodes.iter() {
                if is_below(path, child, depth == "1") {
                    body.push_str(&prop_response(child, node));
                }
            }
        }
        multistatus(&body)
    }

    fn mkcol(&self, path: &str) -> HttpResponse {
        let mut state = self.state.lock();
        if state.nodes.contains_key(path) {
            return empty(405);
        }
        if !state.is_dir(&parent_of(path)) {
            return empty(409);
        }
        state.nodes.insert(path.to_string(), Node::dir());
        empty(201)
    }

    fn put(&self, path: &str, data: Bytes) -> HttpResponse {
        let mut state = self.state.lock();
        if state.locked.contains(path) {
            return empty(423);
        }
        if !state.is_dir(&parent_of(path)) {
            return empty(409);
        }
        if state.is_dir(path) {
            return empty(405);
        }
        state.version += 1;
        let now = Utc::now();
        let etag = format!("\"{}\"", state.version);
        let previous = state.nodes.insert(
            path.to_string(),
            Node {
                data: Some(data),
                etag,
                created: now,
                modified: now,
            },
        );
        match previous {
            Some(_) => empty(204),
            None => empty(201),
        }
    }

    fn get(&self, path: &str, request_headers: &HeaderMap) -> HttpResponse {
        let (data, etag) = {
            let state = self.state.lock();
            match state.nodes.get(path) {
                None => return empty(404),
                Some(node) => match &node.data {
                    None => return empty(200),
                    Some(data) => (data.clone(), node.etag.clone()),
                },
            }
        };

        let total = data.len() as u64;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type_for(path)));
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(ETAG, value);
        }
        if self.accept_ranges.load(Ordering::SeqCst) {
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }

        let start = header_str(request_headers, RANGE.as_str())
            .and_then(parse_range_start)
            .filter(|_| self.honour_ranges.load(Ordering::SeqCst));
        let (status, body) = match start {
            Some(start) if start >= total => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
                    headers.insert(CONTENT_RANGE, value);
                }
                return respond(416, headers, Bytes::new());
            }
            Some(start) => {
                if let Ok(value) =
                    HeaderValue::from_str(&format!("bytes {}-{}/{}", start, total - 1, total))
                {
                    headers.insert(CONTENT_RANGE, value);
                }
                (206, data.slice(start as usize..))
            }
            None => (200, data),
        };
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let chunk_size = self.chunk_size.load(Ordering::SeqCst);
        let mut chunks: Vec<Result<Bytes, TransportError>> = body
            .chunks(chunk_size)
            .map(|chunk| Ok(body.slice_ref(chunk)))
            .collect();
        let failure = *self.body_failure.lock();
        if failure == BodyFailure::OnceAfterFirstChunk {
            *self.body_failure.lock() = BodyFailure::None;
        }
        match failure {
            BodyFailure::None => {}
            BodyFailure::AfterFirstChunk | BodyFailure::OnceAfterFirstChunk => {
                if chunks.len() > 1 {
                    chunks.truncate(1);
                    chunks.push(Err(TransportError::network("connection reset by peer")));
                }
            }
            BodyFailure::BeforeFirstChunk => {
                if !chunks.is_empty() {
                    chunks = vec![Err(TransportError::timeout("read timed out"))];
                }
            }
        }

        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
        HttpResponse::new(status, headers, Box::pin(futures::stream::iter(chunks)))
    }

    fn delete(&self, path: &str) -> HttpResponse {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(path) {
            return empty(404);
        }
        if state.locked.contains(path) {
            return empty(423);
        }

        let locked: Vec<String> = state
            .locked
            .iter()
            .filter(|l| is_below(path, l, false))
            .cloned()
            .collect();
        if !locked.is_empty() {
            let body: String = locked
                .iter()
                .map(|l| {
                    format!(
                        "<d:response><d:href>{}</d:href><d:status>HTTP/1.1 423 Locked</d:status></d:response>",
                        encode_href(l, state.is_dir(l))
                    )
                })
                .collect();
            return multistatus(&body);
        }

        state.remove_subtree(path);
        empty(204)
    }

    fn transfer(&self, is_move: bool, source: &str, headers: &HeaderMap) -> HttpResponse {
        let Some(destination) = header_str(headers, "destination")
            .and_then(|d| Url::parse(d).ok())
            .map(|u| urls::normalize(&urls::href_path(u.path())))
        else {
            return empty(400);
        };
        let overwrite = header_str(headers, "overwrite").map_or(true, |v| v != "F");
        let shallow = header_str(headers, "depth") == Some("0");

        let mut state = self.state.lock();
        if !state.nodes.contains_key(source) {
            return empty(404);
        }
        if source == destination {
            return empty(403);
        }
        if state.locked.contains(source) || state.locked.contains(&destination) {
            return empty(423);
        }
        if !state.is_dir(&parent_of(&destination)) {
            return empty(409);
        }
        let existed = state.nodes.contains_key(&destination);
        if existed && !overwrite {
            return empty(412);
        }
        if existed {
            state.remove_subtree(&destination);
        }

        let keys = if shallow && !is_move {
            vec![source.to_string()]
        } else {
            state.subtree(source)
        };
        let copies: Vec<(String, Node)> = keys
            .iter()
            .filter_map(|key| {
                let node = state.nodes.get(key)?;
                let target = format!("{}{}", destination, &key[source.len()..]);
                Some((target, node.copy()))
            })
            .collect();
        if is_move {
            state.remove_subtree(source);
        }
        state.nodes.extend(copies);

        if existed {
            empty(204)
        } else {
            empty(201)
        }
    }
}

#[async_trait]
impl Transport for MemoryServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let path = urls::normalize(&urls::href_path(url.path()));

        let injected = {
            let mut state = self.state.lock();
            state.requests.push(RecordedRequest {
                method: method.clone(),
                path: path.clone(),
                headers: headers.clone(),
            });
            state.injected.pop_front()
        };
        match injected {
            Some(Injected::Status(status)) => return Ok(empty(status)),
            Some(Injected::Refused) => return Err(TransportError::network("connection refused")),
            None => {}
        }

        let response = match method.as_str() {
            "OPTIONS" => self.options(),
            "PROPFIND" => self.propfind(&path, &headers),
            "PROPPATCH" => multistatus(&format!(
                "<d:response><d:href>{}</d:href><d:status>HTTP/1.1 200 OK</d:status></d:response>",
                encode_href(&path, false)
            )),
            "MKCOL" => self.mkcol(&path),
            "PUT" => {
                let data = body
                    .collect()
                    .await
                    .map_err(|e| TransportError::network(e.to_string()))?;
                self.put(&path, data)
            }
            "GET" => self.get(&path, &headers),
            "DELETE" => self.delete(&path),
            "COPY" => self.transfer(false, &path, &headers),
            "MOVE" => self.transfer(true, &path, &headers),
            "LOCK" => {
                self.state.lock().locked.insert(path);
                empty(200)
            }
            "UNLOCK" => {
                self.state.lock().locked.remove(&path);
                empty(204)
            }
            _ => empty(405),
        };
        Ok(response)
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryServer")
            .field("root", &self.root)
            .field("nodes", &state.nodes.keys().collect::<Vec<_>>())
            .field("locked", &state.locked)
            .finish_non_exhaustive()
    }
}
