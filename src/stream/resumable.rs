//! Seekable, reconnecting byte stream over a remote file.

use std::io::SeekFrom;

use bytes::{Bytes, BytesMut};

use crate::client::webdav::WebdavClient;
use crate::error::{ClientError, Result, SeekError};
use crate::stream::chunks::ChunkIter;
use crate::stream::lines::find_delimiter;

/// Top-level lifecycle of a [`ResumableStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, no request sent yet. The first read opens it.
    Unopened,
    /// A GET is in flight or its body is being consumed.
    Open,
    /// Closed; every further read or seek fails.
    Closed,
}

/// Read handle for a remote file.
///
/// The logical position ([`tell`](Self::tell)) counts the bytes handed to the caller.
/// When the connection drops mid-body and the server supports ranges, the GET is
/// reissued from where the body stopped and the caller sees one contiguous stream.
///
/// A stream is not shared between tasks; every method takes `&mut self`.
pub struct ResumableStream {
    client: WebdavClient,
    path: String,
    chunk_size: usize,
    state: StreamState,
    chunks: Option<ChunkIter>,
    buffer: BytesMut,
    loc: u64,
    size: Option<u64>,
    content_type: Option<String>,
}

impl ResumableStream {
    /// Stream over `path`, pulling chunks of at most `chunk_size` bytes. Nothing is sent yet.
    pub fn new(client: WebdavClient, path: impl Into<String>, chunk_size: usize) -> Self {
        ResumableStream {
            client,
            path: path.into(),
            chunk_size: chunk_size.max(1),
            state: StreamState::Unopened,
            chunks: None,
            buffer: BytesMut::new(),
            loc: 0,
            size: None,
            content_type: None,
        }
    }

    /// Resource path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Logical position.
    pub fn tell(&self) -> u64 {
        self.loc
    }

    /// Total size, once a response reported it.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// `Content-Type` of the first response.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Range support as far as it is known without probing.
    pub fn supports_ranges(&self) -> Option<bool> {
        if self.chunks.as_ref().is_some_and(ChunkIter::accepts_ranges) {
            return Some(true);
        }
        self.client.features().cached_supports_ranges()
    }

    /// Send the GET at the current position.
    pub async fn open(&mut self) -> Result<()> {
        if self.state == StreamState::Closed {
            return Err(ClientError::StreamClosed);
        }
        self.connect(self.loc).await
    }

    /// Replace the connection with a GET at `at`. On failure the old connection,
    /// buffer and position stay untouched.
    async fn connect(&mut self, at: u64) -> Result<()> {
        let chunks = ChunkIter::open(self.client.clone(), &self.path, at, self.chunk_size).await?;
        self.buffer.clear();
        if self.size.is_none() {
            self.size = chunks.size();
        }
        if self.content_type.is_none() {
            self.content_type = chunks.content_type().map(str::to_string);
        }
        self.chunks = Some(chunks);
        self.loc = at;
        self.state = StreamState::Open;
        Ok(())
    }

    async fn ensure_open(&mut self) -> Result<()> {
        match self.state {
            StreamState::Open => Ok(()),
            StreamState::Unopened => self.open().await,
            StreamState::Closed => Err(ClientError::StreamClosed),
        }
    }

    /// Pull one chunk into the buffer. Returns `false` at the end of the resource.
    async fn pull(&mut self) -> Result<bool> {
        let Some(chunks) = self.chunks.as_mut() else {
            return Ok(false);
        };
        match chunks.next_chunk().await? {
            Some(chunk) => {
                self.buffer.extend_from_slice(&chunk);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buffer.len());
        self.loc += n as u64;
        self.buffer.split_to(n).freeze()
    }

    /// Up to `n` bytes; fewer only at the end of the resource.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_open().await?;
        while self.buffer.len() < n {
            if !self.pull().await? {
                break;
            }
        }
        Ok(self.take(n))
    }

    /// Everything up to the end of the resource.
    pub async fn read_all(&mut self) -> Result<Bytes> {
        self.ensure_open().await?;
        while self.pull().await? {}
        let n = self.buffer.len();
        Ok(self.take(n))
    }

    /// Up to `n` bytes with at most one chunk pulled from the network.
    ///
    /// Returns buffered bytes first; empty only at the end of the resource (or for `n == 0`).
    pub async fn read1(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_open().await?;
        if self.buffer.is_empty() && n > 0 {
            self.pull().await?;
        }
        Ok(self.take(n))
    }

    /// Fill `buf` as far as the resource allows. Returns the number of bytes written.
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.read(buf.len()).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Like [`read_into`](Self::read_into) with at most one network pull.
    pub async fn read_into1(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.read1(buf.len()).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Bytes up to and including the next `delimiter`, or up to the end of the resource.
    ///
    /// Empty at the end of the resource.
    pub async fn read_until(&mut self, delimiter: &[u8]) -> Result<Bytes> {
        self.ensure_open().await?;
        if delimiter.is_empty() {
            return Ok(Bytes::new());
        }

        let mut searched = 0;
        loop {
            if let Some(found) = find_delimiter(&self.buffer[searched..], delimiter) {
                return Ok(self.take(searched + found + delimiter.len()));
            }
            // A delimiter may straddle the boundary with the next chunk.
            searched = self.buffer.len().saturating_sub(delimiter.len() - 1);
            if !self.pull().await? {
                let n = self.buffer.len();
                return Ok(self.take(n));
            }
        }
    }

    /// Move the logical position.
    ///
    /// Forward relative seeks read and discard. Anything else that changes the position
    /// reopens the GET at the target, which needs Range support unless the target is 0.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.state == StreamState::Closed {
            return Err(ClientError::StreamClosed);
        }

        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(offset) if offset >= 0 => {
                let mut remaining = offset as u64;
                while remaining > 0 {
                    let step = remaining.min(self.chunk_size as u64) as usize;
                    let skipped = self.read(step).await?.len();
                    if skipped == 0 {
                        break;
                    }
                    remaining -= skipped as u64;
                }
                return Ok(self.loc);
            }
            SeekFrom::Current(offset) => i128::from(self.loc) + i128::from(offset),
            SeekFrom::End(offset) => {
                if self.size.is_none() {
                    self.ensure_open().await?;
                }
                let size = self.size.ok_or(SeekError::UnknownSize)?;
                i128::from(size) + i128::from(offset)
            }
        };

        if target < 0 {
            return Err(SeekError::BeforeStart.into());
        }
        let target = target as u64;
        if self.state == StreamState::Open && target == self.loc {
            return Ok(self.loc);
        }

        let hinted = self.chunks.as_ref().is_some_and(ChunkIter::accepts_ranges);
        if target > 0 && !hinted && !self.client.supports_ranges().await {
            return Err(SeekError::RangesUnsupported.into());
        }

        self.connect(target).await?;
        Ok(self.loc)
    }

    /// Release the connection and drop buffered bytes. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state != StreamState::Closed {
            tracing::debug!("Closing stream for {} at byte {}", self.path, self.loc);
        }
        self.chunks = None;
        self.buffer.clear();
        self.state = StreamState::Closed;
    }
}

impl std::fmt::Debug for ResumableStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableStream")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("loc", &self.loc)
            .field("size", &self.size)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
