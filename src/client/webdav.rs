//! The WebDAV client façade.
//!
//! Joins resource paths onto the base URL, classifies error statuses, retries what
//! is worth retrying, and turns multistatus bodies into structured results.
//!
//! # Examples
//!
//! ```ignore
//! use webdav_http::client::{ClientConfig, Credentials, WebdavClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         credentials: Some(Credentials::basic("admin", "secret")),
//!         ..Default::default()
//!     };
//!     let client = WebdavClient::with_config("https://example.org/remote.php/dav/files/admin", config)?;
//!
//!     client.makedirs("data/2024", true).await?;
//!     client.put_bytes("data/2024/hello.txt", "hello", true).await?;
//!     for entry in client.ls("data/2024").await? {
//!         println!("{} {:?}", entry.name, entry.size);
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::client::config::ClientConfig;
use crate::client::features::DetectedFeatures;
use crate::client::retry::{self, RetryPolicy};
use crate::client::transport::{BodyStream, HttpResponse, RequestBody, ReqwestTransport, Transport};
use crate::client::verbs::DavHttpClient;
use crate::error::{ClientError, Operation, Result};
use crate::protocol::constants::{headers as dav_headers, methods};
use crate::protocol::headers::{overwrite_header, parse_dav_header, Depth};
use crate::protocol::multistatus::{
    parse_multistatus_response, prepare_propfind_request_data, DavProperties, DavResponse,
    MultiStatusResponse, ResourceType, MAPPING_PROPS,
};
use crate::protocol::{reason_phrase, urls};
use crate::stream::{Callback, CallbackIo, PeekLength, ResumableStream, TextStream};

/// Entry returned by [`WebdavClient::ls`] and [`WebdavClient::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
    /// Path relative to the base URL.
    pub name: String,
    /// `href` as reported by the server.
    pub href: String,
    /// `getcontentlength`
    pub size: Option<u64>,
    pub created: Option<DateTime<FixedOffset>>,
    pub modified: Option<DateTime<FixedOffset>>,
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub etag: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
    pub display_name: Option<String>,
}

impl ResourceInfo {
    /// Build the entry for one multistatus record.
    pub fn from_response(response: &DavResponse, base_url: &Url) -> Self {
        let DavProperties {
            content_length,
            etag,
            created,
            modified,
            content_type,
            content_language,
            display_name,
            resource_type,
            ..
        } = response.properties.clone();

        ResourceInfo {
            name: response.path_relative_to(base_url),
            href: response.href.clone(),
            size: content_length,
            created,
            modified,
            content_type,
            content_language,
            etag,
            resource_type,
            display_name,
        }
    }

    /// Whether the entry is a collection.
    pub fn is_dir(&self) -> bool {
        self.resource_type == Some(ResourceType::Directory)
    }
}

/// Reject error statuses with the error kind they stand for.
pub(crate) fn check_status(response: HttpResponse, method: &Method, url: &Url, path: &str) -> Result<HttpResponse> {
    match response.status_code() {
        404 => Err(ClientError::NotFound {
            path: path.to_string(),
        }),
        507 => Err(ClientError::InsufficientStorage {
            path: path.to_string(),
        }),
        502 => Err(ClientError::BadGateway),
        status if status >= 400 => Err(ClientError::Http {
            status,
            reason: reason_phrase(status, response.status.canonical_reason()).unwrap_or_default(),
            method: method.clone(),
            url: url.to_string(),
        }),
        _ => Ok(response),
    }
}

fn depth(depth: Depth) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(dav_headers::DEPTH, HeaderValue::from_static(depth.as_str()));
    headers
}

/// Client for one WebDAV server, rooted at a base URL.
///
/// Cheap to clone: clones share the transport, configuration and the detected
/// server features.
#[derive(Clone)]
pub struct WebdavClient {
    base_url: Url,
    http: DavHttpClient,
    config: Arc<ClientConfig>,
    features: Arc<DetectedFeatures>,
    retry: RetryPolicy,
}

impl WebdavClient {
    /// Client with the default configuration.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Client over `reqwest` with a custom configuration.
    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::with_transport(base_url, config, transport)
    }

    /// Client over any transport.
    pub fn with_transport(base_url: &str, config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http = DavHttpClient::with_config(transport, &config)?;
        Ok(WebdavClient {
            base_url,
            http,
            features: Arc::new(DetectedFeatures::with_supports_ranges(config.supports_ranges)),
            retry: RetryPolicy::from_config(&config),
            config: Arc::new(config),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Verb client, for requests the façade does not model (LOCK, PROPPATCH, ...).
    pub fn http(&self) -> &DavHttpClient {
        &self.http
    }

    /// Features detected on the server.
    pub fn features(&self) -> &DetectedFeatures {
        &self.features
    }

    /// Whether the server supports byte ranges; probes once per client.
    pub async fn supports_ranges(&self) -> bool {
        self.features.supports_ranges(&self.http, &self.base_url).await
    }

    /// Absolute URL of a resource path.
    pub fn join_url(&self, path: &str) -> Url {
        urls::join_url(&self.base_url, path, false)
    }

    fn base_path(&self) -> String {
        urls::base_path(&self.base_url)
    }

    /// DAV compliance classes advertised for `path`.
    pub async fn options(&self, path: &str) -> Result<BTreeSet<String>> {
        let response = self
            .request(Method::OPTIONS, path, HeaderMap::new(), RequestBody::Empty)
            .await?;
        Ok(parse_dav_header(response.header(dav_headers::DAV).unwrap_or_default()))
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.retry
            .run(op, retry::is_retryable_error, retry::should_retry)
            .await
    }

    async fn request_once(&self, method: Method, path: &str, headers: HeaderMap, body: RequestBody) -> Result<HttpResponse> {
        let url = self.join_url(path);
        let response = self.http.request(method.clone(), url.clone(), headers, body).await?;
        let response = check_status(response, &method, &url, path)?;

        if response.status_code() != 207 || method.as_str() == methods::PROPFIND {
            return Ok(response);
        }

        // A 207 for anything but PROPFIND reports per-resource failures.
        let status = response.status;
        let headers = response.headers.clone();
        let body = response.bytes().await?;
        let result = parse_multistatus_response(status.as_u16(), &String::from_utf8_lossy(&body))?;
        result
            .raise_for_status()
            .map_err(|source| ClientError::MultiStatus {
                operation: Operation::from_method(&method),
                source,
            })?;
        Ok(HttpResponse::from_bytes(status, headers, body))
    }

    /// Send `method` to `path` with status handling.
    ///
    /// 404, 507 and 502 become their own error kinds, other error statuses become
    /// [`ClientError::Http`], and a 207 to anything but PROPFIND is checked for
    /// failed resources. Idempotent requests with replayable bodies are retried
    /// according to the policy; everything else is sent once.
    pub async fn request(&self, method: Method, path: &str, headers: HeaderMap, body: RequestBody) -> Result<HttpResponse> {
        if !retry::is_idempotent(&method) {
            return self.request_once(method, path, headers, body).await;
        }
        let payload = match body {
            RequestBody::Stream(stream) => {
                return self
                    .request_once(method, path, headers, RequestBody::Stream(stream))
                    .await
            }
            RequestBody::Bytes(bytes) => Some(bytes),
            RequestBody::Empty => None,
        };

        let (method, headers, payload) = (&method, &headers, &payload);
        self.with_retry(move || async move {
            let body = payload.clone().map(RequestBody::Bytes).unwrap_or_default();
            self.request_once(method.clone(), path, headers.clone(), body).await
        })
        .await
    }

    /// PROPFIND `path`. Without `data` the server returns all properties.
    pub async fn propfind(&self, path: &str, data: Option<String>, headers: HeaderMap) -> Result<MultiStatusResponse> {
        let body = data.map(RequestBody::from).unwrap_or_default();
        let response = self
            .request(methods::method(methods::PROPFIND), path, headers, body)
            .await?;
        let status = response.status_code();
        let text = response.text().await?;
        Ok(parse_multistatus_response(status, &text)?)
    }

    /// Properties of one resource, optionally restricted to a single property.
    pub async fn get_props(&self, path: &str, name: Option<&str>, namespace: Option<&str>) -> Result<DavProperties> {
        let data = prepare_propfind_request_data(name, namespace);
        let mut headers = depth(Depth::Zero);
        if data.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        }
        let result = self.propfind(path, data, headers).await?;
        let response = result.get_response_for_path(&self.base_path(), path)?;
        Ok(response.properties.clone())
    }

    /// Raw text of a single property, by library name (`etag`) or DAV name (`getetag`).
    ///
    /// Properties outside the known set are requested but not interpreted, so they
    /// come back as `None`.
    pub async fn get_property(&self, path: &str, name: &str, namespace: Option<&str>) -> Result<Option<String>> {
        let props = self.get_props(path, Some(name), namespace).await?;
        let library = MAPPING_PROPS
            .iter()
            .find(|(library, dav)| *library == name || *dav == name)
            .map(|(library, _)| *library);
        Ok(library.and_then(|key| props.raw.get(key).cloned().flatten()))
    }

    async fn transfer(&self, method: Method, from: &str, to: &str, overwrite: bool, depth: Depth) -> Result<()> {
        let destination = self.join_url(to);
        let mut headers = HeaderMap::new();
        headers.insert(
            dav_headers::DESTINATION,
            HeaderValue::from_str(destination.as_str())
                .map_err(|_| ClientError::InvalidHeader(destination.to_string()))?,
        );
        headers.insert(dav_headers::OVERWRITE, HeaderValue::from_static(overwrite_header(overwrite)));
        headers.insert(dav_headers::DEPTH, HeaderValue::from_static(depth.as_str()));

        // A repeated MOVE, or a COPY without overwrite, fails on its own earlier success.
        let retried = retry::is_idempotent(&method) && overwrite;
        let operation = Operation::from_method(&method);
        let (method, headers) = (&method, &headers);
        let op = move || async move {
            self.request_once(method.clone(), from, headers.clone(), RequestBody::Empty)
                .await
                .map_err(|err| match err {
                    ClientError::Http { status: 403, .. } => ClientError::Forbidden(
                        "the source and the destination could be the same".to_string(),
                    ),
                    ClientError::Http { status: 409, .. } => ClientError::Conflict(format!(
                        "there was a conflict when trying to {} the resource",
                        operation
                    )),
                    ClientError::Http { status: 412, .. } => {
                        ClientError::AlreadyExists { path: to.to_string() }
                    }
                    ClientError::Http { status: 423, .. } => ClientError::Locked(
                        "the source or the destination resource is locked".to_string(),
                    ),
                    err => err,
                })
        };
        if retried {
            self.with_retry(op).await?;
        } else {
            op().await?;
        }
        Ok(())
    }

    /// MOVE `from` to `to`.
    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        self.transfer(methods::method(methods::MOVE), from, to, overwrite, Depth::Infinity)
            .await
    }

    /// COPY `from` to `to`.
    pub async fn copy(&self, from: &str, to: &str, depth: Depth, overwrite: bool) -> Result<()> {
        self.transfer(methods::method(methods::COPY), from, to, overwrite, depth)
            .await
    }

    /// Create a collection.
    pub async fn mkdir(&self, path: &str, exist_ok: bool) -> Result<()> {
        let result = self
            .request(methods::method(methods::MKCOL), path, HeaderMap::new(), RequestBody::Empty)
            .await;

        match result {
            Ok(response) => match response.status_code() {
                200 | 201 => Ok(()),
                status => Err(ClientError::UnexpectedStatus {
                    status,
                    operation: Operation::Mkdir,
                }),
            },
            Err(ClientError::Http { status: 405, .. }) if exist_ok => Ok(()),
            Err(ClientError::Http { status: 405, .. }) => Err(ClientError::AlreadyExists {
                path: path.to_string(),
            }),
            Err(ClientError::Http { status: 403, .. }) => Err(ClientError::Forbidden(
                "the server does not allow creation in the namespace or cannot accept members"
                    .to_string(),
            )),
            Err(ClientError::Http { status: 409, .. }) => Err(ClientError::Conflict(
                "parent of the collection does not exist".to_string(),
            )),
            Err(err) => Err(err),
        }
    }

    /// Create a collection and all missing parents.
    pub async fn makedirs(&self, path: &str, exist_ok: bool) -> Result<()> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for n in 1..=parts.len() {
            self.mkdir(&parts[..n].join("/"), exist_ok).await?;
        }
        Ok(())
    }

    /// DELETE a resource (recursively for collections).
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.with_retry(move || async move {
            self.request_once(Method::DELETE, path, HeaderMap::new(), RequestBody::Empty)
                .await
                .map_err(|err| match err {
                    ClientError::Http { status: 423, .. } => {
                        ClientError::Locked("the resource is locked".to_string())
                    }
                    err => err,
                })
        })
        .await?;
        Ok(())
    }

    /// Members of a collection. A file lists as itself.
    pub async fn ls(&self, path: &str) -> Result<Vec<ResourceInfo>> {
        let result = self.propfind(path, None, depth(Depth::One)).await?;
        let mut responses = result.responses;
        if responses.len() > 1 {
            responses.remove(&urls::join(&self.base_path(), path));
        }
        Ok(responses
            .values()
            .map(|response| ResourceInfo::from_response(response, &self.base_url))
            .collect())
    }

    /// Names of the members of a collection, relative to the base URL.
    pub async fn ls_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.ls(path).await?.into_iter().map(|info| info.name).collect())
    }

    /// Information about one resource.
    pub async fn info(&self, path: &str) -> Result<ResourceInfo> {
        let result = self.propfind(path, None, depth(Depth::Zero)).await?;
        let response = result.get_response_for_path(&self.base_path(), path)?;
        Ok(ResourceInfo::from_response(response, &self.base_url))
    }

    /// Whether the resource exists.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        match self.propfind(path, None, depth(Depth::Zero)).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether the resource is a collection.
    pub async fn isdir(&self, path: &str) -> Result<bool> {
        Ok(self.get_props(path, None, None).await?.is_collection())
    }

    /// Whether the resource is not a collection.
    pub async fn isfile(&self, path: &str) -> Result<bool> {
        Ok(!self.isdir(path).await?)
    }

    pub async fn content_length(&self, path: &str) -> Result<Option<u64>> {
        Ok(self.get_props(path, Some("content_length"), None).await?.content_length)
    }

    pub async fn created(&self, path: &str) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(self.get_props(path, Some("created"), None).await?.created)
    }

    pub async fn modified(&self, path: &str) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(self.get_props(path, Some("modified"), None).await?.modified)
    }

    pub async fn etag(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get_props(path, Some("etag"), None).await?.etag)
    }

    pub async fn content_type(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get_props(path, Some("content_type"), None).await?.content_type)
    }

    pub async fn content_language(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .get_props(path, Some("content_language"), None)
            .await?
            .content_language)
    }

    pub async fn display_name(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get_props(path, Some("display_name"), None).await?.display_name)
    }

    /// Open a file for streaming reads.
    pub async fn open(&self, path: &str) -> Result<ResumableStream> {
        self.open_with_chunk_size(path, self.config.chunk_size()).await
    }

    /// Open a file, handing out chunks of at most `chunk_size` bytes.
    pub async fn open_with_chunk_size(&self, path: &str, chunk_size: usize) -> Result<ResumableStream> {
        if self.isdir(path).await? {
            return Err(ClientError::IsACollection {
                path: path.to_string(),
            });
        }
        let mut stream = ResumableStream::new(self.clone(), path, chunk_size);
        stream.open().await?;
        Ok(stream)
    }

    /// Open a file for UTF-8 text reads.
    pub async fn open_text(&self, path: &str) -> Result<TextStream> {
        Ok(TextStream::new(self.open(path).await?))
    }

    /// Copy a remote file into `writer`, reporting each write to `callback`.
    ///
    /// Returns the number of bytes written.
    pub async fn download_fileobj<W>(&self, from: &str, writer: W, callback: Option<Callback>) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.open(from).await?;
        let mut writer = CallbackIo::new(writer, callback);
        let mut total = 0u64;
        loop {
            let chunk = stream.read1(usize::MAX).await?;
            if chunk.is_empty() {
                break;
            }
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;
        stream.close();
        Ok(total)
    }

    /// Download a remote file to a local path.
    pub async fn download_file(&self, from: &str, to: impl AsRef<Path>, callback: Option<Callback>) -> Result<u64> {
        let file = tokio::fs::File::create(to).await?;
        self.download_fileobj(from, file, callback).await
    }

    /// Upload from a reader, reporting each read to `callback`.
    ///
    /// The length is peeked from the reader and sent as `Content-Length`; readers of
    /// unknown length are sent chunked. Without `overwrite` an existing target fails
    /// with [`ClientError::AlreadyExists`].
    pub async fn upload_fileobj<R>(&self, mut reader: R, to: &str, overwrite: bool, callback: Option<Callback>) -> Result<()>
    where
        R: AsyncRead + PeekLength + Send + Sync + Unpin + 'static,
    {
        let length = match reader.peek_length().await {
            Ok(length) => length,
            Err(e) => {
                tracing::debug!("Could not determine upload length for {}: {}", to, e);
                None
            }
        };
        let wrapped = CallbackIo::new(reader, callback);
        let body: BodyStream = Box::pin(ReaderStream::with_capacity(wrapped, self.config.chunk_size()));
        self.upload_stream(body, to, length, overwrite).await
    }

    /// Upload a byte stream. `length` is sent as `Content-Length` when known.
    pub async fn upload_stream(&self, body: BodyStream, to: &str, length: Option<u64>, overwrite: bool) -> Result<()> {
        if !overwrite && self.exists(to).await? {
            return Err(ClientError::AlreadyExists { path: to.to_string() });
        }
        let mut headers = HeaderMap::new();
        if let Some(length) = length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
        self.request(Method::PUT, to, headers, RequestBody::Stream(body)).await?;
        Ok(())
    }

    /// Upload a local file.
    pub async fn upload_file(&self, from: impl AsRef<Path>, to: &str, overwrite: bool, callback: Option<Callback>) -> Result<()> {
        let file = tokio::fs::File::open(from).await?;
        self.upload_fileobj(file, to, overwrite, callback).await
    }

    /// Upload an in-memory body. Retried like any replayable request.
    pub async fn put_bytes(&self, to: &str, data: impl Into<Bytes>, overwrite: bool) -> Result<()> {
        if !overwrite && self.exists(to).await? {
            return Err(ClientError::AlreadyExists { path: to.to_string() });
        }
        self.request(Method::PUT, to, HeaderMap::new(), RequestBody::Bytes(data.into()))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for WebdavClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebdavClient")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
