//! File handles of [`WebdavFileSystem`](super::WebdavFileSystem).

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use tokio::io::AsyncWrite;

use crate::client::WebdavClient;
use crate::error::ClientError;
use crate::fs::FsResult;
use crate::stream::{ResumableStream, TextStream};

/// Read handle of a remote file.
#[derive(Debug)]
pub struct WebdavFile {
    stream: ResumableStream,
}

impl WebdavFile {
    pub fn new(stream: ResumableStream) -> Self {
        WebdavFile { stream }
    }

    pub fn path(&self) -> &str {
        self.stream.path()
    }

    /// Size reported by the server, if any.
    pub fn size(&self) -> Option<u64> {
        self.stream.size()
    }

    pub fn tell(&self) -> u64 {
        self.stream.tell()
    }

    pub async fn read(&mut self, n: usize) -> FsResult<Bytes> {
        Ok(self.stream.read(n).await?)
    }

    pub async fn read_all(&mut self) -> FsResult<Bytes> {
        Ok(self.stream.read_all().await?)
    }

    pub async fn read_into(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        Ok(self.stream.read_into(buf).await?)
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        Ok(self.stream.seek(pos).await?)
    }

    /// Next line including its `\n`; empty at the end of the file.
    pub async fn read_line(&mut self) -> FsResult<Bytes> {
        Ok(self.stream.read_until(b"\n").await?)
    }

    /// Remaining lines, each with its `\n` (except possibly the last).
    pub async fn lines(&mut self) -> FsResult<Vec<Bytes>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Iterate over the remaining content chunk by chunk.
    pub fn into_chunks(self) -> impl Stream<Item = FsResult<Bytes>> {
        stream::unfold(Some(self.stream), |state| async move {
            let mut stream = state?;
            match stream.read1(usize::MAX).await {
                Ok(chunk) if chunk.is_empty() => None,
                Ok(chunk) => Some((Ok(chunk), Some(stream))),
                Err(err) => Some((Err(err.into()), None)),
            }
        })
    }

    /// Text view of the remaining content.
    pub fn into_text(self) -> TextStream {
        TextStream::new(self.stream)
    }

    pub fn close(&mut self) {
        self.stream.close();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Open,
    Committed,
    Discarded,
}

/// Write handle of a remote file.
///
/// WebDAV has no append or partial write, so everything written is buffered in memory
/// and uploaded with a single PUT by [`commit`](Self::commit) (or [`close`](Self::close)).
/// [`discard`](Self::discard) drops the buffer without touching the server.
#[derive(Debug)]
pub struct WebdavWriteFile {
    client: WebdavClient,
    path: String,
    buffer: BytesMut,
    state: WriteState,
}

impl WebdavWriteFile {
    pub fn new(client: WebdavClient, path: impl Into<String>) -> Self {
        WebdavWriteFile {
            client,
            path: path.into(),
            buffer: BytesMut::new(),
            state: WriteState::Open,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the handle was committed or discarded.
    pub fn is_closed(&self) -> bool {
        self.state != WriteState::Open
    }

    /// Buffer `data`.
    pub fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        if self.is_closed() {
            return Err(ClientError::StreamClosed.into());
        }
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    /// Upload the buffer, replacing the remote file.
    pub async fn commit(&mut self) -> FsResult<()> {
        if self.is_closed() {
            return Err(ClientError::StreamClosed.into());
        }
        // Keep the buffer until the PUT succeeds so a failed commit can be repeated.
        let data = Bytes::copy_from_slice(&self.buffer);
        self.client.put_bytes(&self.path, data, true).await?;
        self.buffer.clear();
        self.state = WriteState::Committed;
        Ok(())
    }

    /// Commit unless already committed or discarded.
    pub async fn close(&mut self) -> FsResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.commit().await
    }

    /// Drop the buffered bytes without uploading.
    pub fn discard(&mut self) {
        self.buffer.clear();
        self.state = WriteState::Discarded;
    }
}

impl AsyncWrite for WebdavWriteFile {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(self.get_mut().write(buf).map_err(io::Error::from))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// Does not upload; call [`WebdavWriteFile::commit`].
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Drop for WebdavWriteFile {
    fn drop(&mut self) {
        if self.state == WriteState::Open && !self.buffer.is_empty() {
            tracing::warn!(
                "Write handle for {} dropped with {} uncommitted bytes",
                self.path,
                self.buffer.len()
            );
        }
    }
}
