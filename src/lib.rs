//! # webdav_http: a WebDAV client for Rust
//!
//! This crate talks to WebDAV servers ([RFC 4918](https://www.rfc-editor.org/rfc/rfc4918)):
//! it issues PROPFIND, MKCOL, COPY, MOVE, DELETE, PUT and GET requests, parses
//! multistatus XML into structured resource metadata, and exposes a filesystem view
//! on top.
//!
//! ## Overview
//!
//! The crate is built from four layers:
//!
//! 1. **Protocol** - multistatus parsing, property requests, header and URL helpers
//! 2. **Client** - a verb client over a pluggable transport, and a façade that maps
//!    statuses to a typed error taxonomy and retries transient failures
//! 3. **Stream** - resumable reads: a dropped GET is reissued with `Range` at the
//!    exact byte where it stopped, and `seek` repositions over ranges
//! 4. **Filesystem** - directory semantics (`rmdir`, recursive `rm`, `mv`, `touch`)
//!    and file handles for tooling that expects a hierarchical filesystem
//!
//! ## Key Features
//!
//! - **Multistatus model**: per-resource statuses, properties and partial failures
//! - **Resumable streaming**: reconnects are invisible to the reader
//! - **Seek support**: absolute, relative and end-relative when the server has ranges
//! - **Retry**: exponential backoff for 423, 429, 5xx and 509
//! - **Feature detection**: Range support probed once per client and cached
//! - **Progress callbacks**: for uploads and downloads
//! - **HTTP Status Codes**:
//!   - `207 Multi-Status` - inspected for failing resources on write operations
//!   - `404 Not Found` - reported with the path involved
//!   - `412 Precondition Failed` - destination exists and `Overwrite: F`
//!   - `416 Range Not Satisfiable` - read at or past the end
//!   - `423 Locked` - retried, then reported
//!   - `507 Insufficient Storage` - reported with the path being written
//!
//! ## Client Usage
//!
//! ```ignore
//! use std::io::SeekFrom;
//! use webdav_http::WebdavClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WebdavClient::new("https://example.org/dav/")?;
//!
//!     client.put_bytes("data/foo", "foo", true).await?;
//!     for entry in client.ls("data").await? {
//!         println!("{} {:?}", entry.name, entry.size);
//!     }
//!     client.move_("data/foo", "data/bar", false).await?;
//!
//!     let mut stream = client.open("data/bar").await?;
//!     stream.seek(SeekFrom::Start(1)).await?;
//!     assert_eq!(&stream.read_all().await?[..], b"oo");
//!     Ok(())
//! }
//! ```
//!
//! ## Filesystem Usage
//!
//! ```ignore
//! use webdav_http::fs::{FileSystem, WebdavFileSystem};
//!
//! let fs = WebdavFileSystem::connect("https://example.org/dav/", Default::default())?;
//! fs.mkdir("reports/2024", true).await?;
//! let mut file = fs.open_write("reports/2024/q1.csv").await?;
//! file.write(b"a,b\n1,2\n")?;
//! file.commit().await?;
//! ```
//!
//! ## Module Structure
//!
//! - **[protocol]** - Constants, header parsing, URL joining, dates and multistatus
//! - **[error]** - Error types and result handling
//! - **[client]** - Transport, verb client, retry, feature detection and the façade
//! - **[stream]** - Resumable byte streams, text lines and progress callbacks
//! - **[fs]** - Filesystem adapter
//! - `testing` - In-memory server for tests (feature `test-utils`)

pub mod client;
pub mod error;
pub mod fs;
pub mod protocol;
pub mod stream;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{ClientConfig, Credentials, ResourceInfo, RetryPolicy, Transport, WebdavClient};
pub use error::{ClientError, Result, SeekError, TransportError};
pub use fs::{FileSystem, FsError, WebdavFileSystem};
pub use protocol::headers::Depth;
pub use stream::{Callback, ResumableStream, TextStream};
