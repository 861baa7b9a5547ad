//! HTTP verb client.
//!
//! A thin layer over a [`Transport`] that knows the WebDAV methods and adds the
//! default headers (authorization, user agent, configured extras) to every request.
//! It does no status handling; that is the façade's job.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use http::{HeaderMap, Method};
use url::Url;

use crate::client::config::ClientConfig;
use crate::client::transport::{HttpRequest, HttpResponse, RequestBody, Transport};
use crate::error::{ClientError, TransportError};
use crate::protocol::constants::methods;

pub use crate::protocol::constants::BANDWIDTH_LIMIT_EXCEEDED;

/// Client for the HTTP and WebDAV verbs.
#[derive(Clone)]
pub struct DavHttpClient {
    transport: Arc<dyn Transport>,
    default_headers: HeaderMap,
}

impl DavHttpClient {
    /// Client without default headers.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        DavHttpClient {
            transport,
            default_headers: HeaderMap::new(),
        }
    }

    /// Client with the default headers described by `config`.
    pub fn with_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Result<Self, ClientError> {
        let mut default_headers = HeaderMap::new();

        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
            default_headers.insert(name, value);
        }
        if !config.user_agent.is_empty() {
            let value = HeaderValue::from_str(&config.user_agent)
                .map_err(|_| ClientError::InvalidHeader(USER_AGENT.to_string()))?;
            default_headers.insert(USER_AGENT, value);
        }
        if let Some(credentials) = &config.credentials {
            let mut value = HeaderValue::from_str(&credentials.authorization())
                .map_err(|_| ClientError::InvalidHeader(AUTHORIZATION.to_string()))?;
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        }

        Ok(DavHttpClient {
            transport,
            default_headers,
        })
    }

    /// Headers added to every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Send a prepared request. Headers already set on it win over the defaults.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
        for (name, value) in &self.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        tracing::debug!("{} {}", request.method, request.url);
        self.transport.send(request).await
    }

    /// Send `method` to `url`.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: RequestBody,
    ) -> Result<HttpResponse, TransportError> {
        self.send(HttpRequest {
            method,
            url,
            headers,
            body,
        })
        .await
    }

    /// PROPFIND
    pub async fn propfind(&self, url: Url, headers: HeaderMap, body: RequestBody) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::PROPFIND), url, headers, body).await
    }

    /// PROPPATCH
    pub async fn proppatch(&self, url: Url, headers: HeaderMap, body: RequestBody) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::PROPPATCH), url, headers, body).await
    }

    /// MKCOL
    pub async fn mkcol(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::MKCOL), url, headers, RequestBody::Empty).await
    }

    /// COPY
    pub async fn copy(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::COPY), url, headers, RequestBody::Empty).await
    }

    /// MOVE
    pub async fn move_(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::MOVE), url, headers, RequestBody::Empty).await
    }

    /// LOCK
    pub async fn lock(&self, url: Url, headers: HeaderMap, body: RequestBody) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::LOCK), url, headers, body).await
    }

    /// UNLOCK
    pub async fn unlock(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(methods::method(methods::UNLOCK), url, headers, RequestBody::Empty).await
    }

    /// GET
    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(Method::GET, url, headers, RequestBody::Empty).await
    }

    /// PUT
    pub async fn put(&self, url: Url, headers: HeaderMap, body: RequestBody) -> Result<HttpResponse, TransportError> {
        self.request(Method::PUT, url, headers, body).await
    }

    /// DELETE
    pub async fn delete(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(Method::DELETE, url, headers, RequestBody::Empty).await
    }

    /// OPTIONS
    pub async fn options(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, TransportError> {
        self.request(Method::OPTIONS, url, headers, RequestBody::Empty).await
    }
}

impl std::fmt::Debug for DavHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DavHttpClient")
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}
