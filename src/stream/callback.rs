//! Progress reporting around readers and writers.

use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWrite, ReadBuf};

/// Progress callback, called with the number of bytes moved by each read or write.
pub type Callback = Arc<dyn Fn(u64) + Send + Sync>;

/// Wraps a reader or writer and reports every transferred byte to a [`Callback`].
///
/// Reads and writes are reported; flush, shutdown and seeks pass straight through.
pub struct CallbackIo<T> {
    inner: T,
    callback: Option<Callback>,
}

impl<T> CallbackIo<T> {
    /// Wrap `inner`. Without a callback the wrapper is transparent.
    pub fn new(inner: T, callback: Option<Callback>) -> Self {
        CallbackIo { inner, callback }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn report(&self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(n as u64);
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for CallbackIo<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.report(buf.filled().len() - before);
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for CallbackIo<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.report(n);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<T: AsyncSeek + Unpin> AsyncSeek for CallbackIo<T> {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().inner).poll_complete(cx)
    }
}

#[async_trait]
impl<T: PeekLength + Send> PeekLength for CallbackIo<T> {
    async fn peek_length(&mut self) -> io::Result<Option<u64>> {
        self.inner.peek_length().await
    }
}

/// Sources that can tell how many bytes are left without consuming them.
#[async_trait]
pub trait PeekLength {
    /// Remaining bytes, or `None` when that cannot be known up front.
    async fn peek_length(&mut self) -> io::Result<Option<u64>>;
}

#[async_trait]
impl PeekLength for tokio::fs::File {
    async fn peek_length(&mut self) -> io::Result<Option<u64>> {
        let len = self.metadata().await?.len();
        let pos = self.stream_position().await?;
        Ok(Some(len.saturating_sub(pos)))
    }
}

#[async_trait]
impl<T: AsRef<[u8]> + Send> PeekLength for Cursor<T> {
    async fn peek_length(&mut self) -> io::Result<Option<u64>> {
        let len = self.get_ref().as_ref().len() as u64;
        Ok(Some(len.saturating_sub(self.position())))
    }
}

#[async_trait]
impl<'a> PeekLength for &'a [u8] {
    async fn peek_length(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.len() as u64))
    }
}

/// Reader whose length is deliberately unknown; uploads from it are sent chunked.
pub struct UnknownLength<R>(pub R);

impl<R: AsyncRead + Unpin> AsyncRead for UnknownLength<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

#[async_trait]
impl<R: Send> PeekLength for UnknownLength<R> {
    async fn peek_length(&mut self) -> io::Result<Option<u64>> {
        Ok(None)
    }
}
