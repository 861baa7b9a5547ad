//! Client configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::client::retry::exponential_backoff;

/// Default size of the chunks handed out by the stream engine.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Credentials sent as the `Authorization` header of every request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Credentials {
    /// HTTP Basic.
    Basic { username: String, password: String },
    /// Bearer token.
    Bearer { token: String },
}

impl Credentials {
    /// Basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                format!("Basic {}", encoded)
            }
            Credentials::Bearer { token } => format!("Bearer {}", token),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

/// Configuration for [`WebdavClient`](crate::client::WebdavClient).
///
/// # Examples
///
/// ```
/// use webdav_http::client::{ClientConfig, Credentials};
///
/// let config = ClientConfig {
///     max_attempts: 5,
///     credentials: Some(Credentials::basic("admin", "secret")),
///     ..Default::default()
/// };
/// assert!(config.retry);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Retry requests that fail with a retryable status.
    pub retry: bool,
    /// Attempts per request when `retry` is on.
    pub max_attempts: u32,
    /// Base of the exponential backoff between attempts.
    pub retry_delay_ms: u64,
    /// Total timeout of a request; `0` disables it.
    pub request_timeout_ms: u64,
    /// Connect timeout; `0` disables it.
    pub connect_timeout_ms: u64,
    /// Idle connections kept per host.
    pub max_idle_connections: u32,
    /// Size of the chunks handed out by the stream engine.
    pub chunk_size: usize,
    /// Consecutive reconnects without progress before a stream gives up.
    pub max_reconnects: u32,
    /// Proxy for all requests; empty for none.
    pub proxy_url: String,
    /// `User-Agent` header.
    pub user_agent: String,
    /// Headers added to every request.
    pub headers: BTreeMap<String, String>,
    /// Skip the OPTIONS probe and assume this answer for Range support.
    pub supports_ranges: Option<bool>,
    /// Credentials for the `Authorization` header.
    pub credentials: Option<Credentials>,
    /// Log retries and reconnects.
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            retry: true,
            max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 0,
            connect_timeout_ms: 10_000,
            max_idle_connections: 16,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_reconnects: 5,
            proxy_url: String::new(),
            user_agent: format!("webdav_http/{}", env!("CARGO_PKG_VERSION")),
            headers: BTreeMap::new(),
            supports_ranges: None,
            credentials: None,
            enable_logging: true,
        }
    }
}

impl ClientConfig {
    /// Attempts per request, honouring `retry`.
    pub fn attempts(&self) -> u32 {
        if self.retry {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(attempt, self.retry_delay_ms)
    }

    /// Request timeout, if enabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// Connect timeout, if enabled.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    /// Chunk size, never zero.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}
