//! Streaming reads and progress-reporting I/O.
//!
//! The stream engine presents a remote file as a seekable byte stream. Underneath it
//! pulls the body of a GET chunk by chunk; when the connection drops with a timeout or
//! network error and the server supports byte ranges, the GET is reissued with
//! `Range: bytes=<pos>-` and reading continues where the body stopped.
//!
//! # Lifecycle
//!
//! ```text
//! Unopened ──open/read──▶ Open ──close──▶ Closed
//!                          │  ▲
//!              drop + Range│  │seek (reopen at target)
//!                          ▼  │
//!                      Reconnecting
//! ```
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ResumableStream`] | Seekable byte stream over one remote file |
//! | [`TextStream`] | UTF-8 lines on top of a [`ResumableStream`] |
//! | [`CallbackIo`] | Reader/writer decorator reporting progress |
//! | [`PeekLength`] | Upload sources that know their length up front |
//!
//! # Examples
//!
//! ```ignore
//! use std::io::SeekFrom;
//! use webdav_http::client::WebdavClient;
//!
//! # async fn run(client: WebdavClient) -> webdav_http::Result<()> {
//! let mut stream = client.open("videos/big.mkv").await?;
//! let header = stream.read(512).await?;
//! stream.seek(SeekFrom::End(-128)).await?;
//! let trailer = stream.read_all().await?;
//! stream.close();
//! # Ok(())
//! # }
//! ```

mod callback;
mod chunks;
mod lines;
mod resumable;

pub use callback::{Callback, CallbackIo, PeekLength, UnknownLength};
pub use lines::{find_delimiter, split_chunk, TextStream};
pub use resumable::{ResumableStream, StreamState};
