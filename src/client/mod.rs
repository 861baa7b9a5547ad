//! WebDAV client implementation.
//!
//! This module provides the client side of the crate, enabling callers to:
//!
//! - **List and inspect resources** through PROPFIND and multistatus parsing
//! - **Create, copy, move and remove** resources and collections
//! - **Stream downloads** that survive dropped connections via `Range`
//! - **Upload** files, readers and byte streams with progress callbacks
//! - **Automatically retry** failed requests with exponential backoff
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── webdav    - WebdavClient façade and status classification
//! ├── verbs     - DavHttpClient: one method per HTTP/WebDAV verb
//! ├── transport - Transport trait, request/response types, reqwest backend
//! ├── features  - Cached server feature detection (Range support)
//! ├── retry     - Retry policy and backoff
//! └── config    - Client configuration
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`WebdavClient`] | Resource-oriented client rooted at a base URL |
//! | [`DavHttpClient`] | Verb client without status handling |
//! | [`Transport`] | Pluggable HTTP backend |
//! | [`RetryPolicy`] | Attempts and backoff for idempotent requests |
//! | [`ClientConfig`] | Client configuration options |
//!
//! # Examples
//!
//! ## Creating a Client
//!
//! ```
//! use webdav_http::client::{ClientConfig, WebdavClient};
//!
//! // Default configuration
//! let client = WebdavClient::new("https://example.org/dav/").unwrap();
//!
//! // Custom configuration
//! let config = ClientConfig {
//!     max_attempts: 5,
//!     retry_delay_ms: 2000,
//!     ..Default::default()
//! };
//! let client = WebdavClient::with_config("https://example.org/dav/", config).unwrap();
//! assert_eq!(client.join_url("a b/c").as_str(), "https://example.org/dav/a%20b/c");
//! ```

pub mod config;
pub mod features;
pub mod retry;
pub mod transport;
pub mod verbs;
pub mod webdav;

pub use config::{ClientConfig, Credentials, DEFAULT_CHUNK_SIZE};
pub use features::DetectedFeatures;
pub use retry::{exponential_backoff, is_idempotent, is_retryable_error, is_retryable_status, should_retry, RetryPolicy};
pub use transport::{
    BodyStream, HttpRequest, HttpResponse, RequestBody, ReqwestTransport, ResponseBody, Transport,
};
pub use verbs::DavHttpClient;
pub use webdav::{ResourceInfo, WebdavClient};
