//! HTTP transport abstraction.
//!
//! Everything above this module talks to a [`Transport`]: it sends one
//! [`HttpRequest`] and hands back an [`HttpResponse`] whose body is pulled chunk by
//! chunk. A body read can fail halfway with a [`TransportError`], which is what the
//! stream engine resumes from.
//!
//! [`ReqwestTransport`] is the production implementation; tests plug in an
//! in-memory server instead.

use std::fmt;
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use http::header::{HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::client::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::protocol::headers::{accepts_byte_ranges, parse_content_range, ContentRange};

/// Streaming request body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + Sync>>;

/// Streaming response body.
pub type ResponseBody = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Body of an outgoing request.
#[derive(Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// In-memory body; can be replayed on retry.
    Bytes(Bytes),
    /// Streamed body; sent once.
    Stream(BodyStream),
}

impl RequestBody {
    /// Copy of the body for another attempt, `None` for streams.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            RequestBody::Empty => Some(RequestBody::Empty),
            RequestBody::Bytes(bytes) => Some(RequestBody::Bytes(bytes.clone())),
            RequestBody::Stream(_) => None,
        }
    }

    /// Length when known up front.
    pub fn len(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBody::Stream(_) => None,
        }
    }

    /// Whether the body is known to be empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Collect the whole body into memory.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Bytes(bytes) => Ok(bytes),
            RequestBody::Stream(stream) => {
                let buf = stream
                    .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                        buf.extend_from_slice(&chunk);
                        Ok(buf)
                    })
                    .await?;
                Ok(buf.freeze())
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Bytes(Bytes::from(text))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(data))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Outgoing request.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Copy of the request, `None` when the body is a stream.
    pub fn try_clone(&self) -> Option<Self> {
        Some(HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
        })
    }

    /// Header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response with a body that has not been read yet.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: ResponseBody,
}

impl HttpResponse {
    /// Response with a streaming body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        HttpResponse { status, headers, body }
    }

    /// Response with a body already in memory.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let chunks: Vec<Result<Bytes, TransportError>> = if body.is_empty() {
            Vec::new()
        } else {
            vec![Ok(body)]
        };
        Self::new(status, headers, Box::pin(futures::stream::iter(chunks)))
    }

    /// Numeric status.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Header value as text.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name.as_ref()).and_then(|v| v.to_str().ok())
    }

    /// `Content-Length`, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Parsed `Content-Range`.
    pub fn content_range(&self) -> Option<ContentRange> {
        self.header(CONTENT_RANGE).and_then(parse_content_range)
    }

    /// `Content-Type`.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Whether the response advertises `Accept-Ranges: bytes`.
    pub fn accepts_ranges(&self) -> bool {
        accepts_byte_ranges(self.header(ACCEPT_RANGES))
    }

    /// Next body chunk; `None` at the end of the body.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.body.next().await
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        let buf = self
            .body
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Read the whole body as UTF-8 text.
    pub async fn text(self) -> Result<String, ClientError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Take the body stream, dropping status and headers.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends requests over some HTTP implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Redirects are followed by the transport.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from the timeouts, pool size and proxy of `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_connections as usize);

        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if !config.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy_url)
                .map_err(|e| TransportError::other(format!("invalid proxy url: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(TransportError::from)?;
        Ok(ReqwestTransport { client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, url.as_str()).headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(TransportError::from);

        Ok(HttpResponse::new(status, headers, Box::pin(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_clone() {
        assert!(RequestBody::Empty.try_clone().is_some());
        assert_eq!(RequestBody::from("abc".to_string()).len(), Some(3));

        let stream: BodyStream = Box::pin(futures::stream::empty::<io::Result<Bytes>>());
        let body = RequestBody::Stream(stream);
        assert!(body.try_clone().is_none());
        assert_eq!(body.len(), None);
    }

    #[tokio::test]
    async fn test_collect_stream_body() {
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let body = RequestBody::Stream(Box::pin(futures::stream::iter(chunks)));
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn test_response_from_bytes() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        let response = HttpResponse::from_bytes(StatusCode::OK, headers, Bytes::from_static(b"hello"));

        assert_eq!(response.content_length(), Some(5));
        assert!(response.accepts_ranges());
        assert_eq!(response.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_empty_response_has_no_chunks() {
        let mut response = HttpResponse::from_bytes(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new());
        assert!(response.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_reqwest_transport_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PROPFIND", "/dav/")
            .match_header("depth", "1")
            .with_status(207)
            .with_header("content-type", "application/xml")
            .with_body("<d:multistatus xmlns:d=\"DAV:\"/>")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/dav/", server.url())).unwrap();
        let request = HttpRequest::new(Method::from_bytes(b"PROPFIND").unwrap(), url)
            .with_header(HeaderName::from_static("depth"), HeaderValue::from_static("1"));

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status_code(), 207);
        assert!(response.text().await.unwrap().contains("multistatus"));
        mock.assert_async().await;
    }
}
