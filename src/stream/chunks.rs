//! Pull-based chunk iteration over a GET, resuming with `Range` after a drop.

use bytes::Bytes;
use http::header::{HeaderValue, RANGE};
use http::{HeaderMap, Method};
use url::Url;

use crate::client::transport::HttpResponse;
use crate::client::webdav::{check_status, WebdavClient};
use crate::error::{ClientError, Result, TransportError};
use crate::protocol::headers::format_range_header;

/// Where the iterator is in its connection lifecycle.
enum Phase {
    /// Reading the body of a live response.
    Streaming(HttpResponse),
    /// The connection dropped; the next pull reissues the GET at the wire position.
    Reconnecting,
    /// No more bytes. Restarting means building a new iterator.
    Exhausted,
}

/// Byte chunks of one remote resource, at most `chunk_size` bytes each.
///
/// `pos` is the wire position: the absolute offset of the next byte the server will
/// send. Chunks already received but not yet handed out are kept in `pending`, so a
/// reconnect at `pos` neither skips nor repeats bytes. A server that ignores `Range`
/// restarts the body at byte 0; `discard` counts the leading bytes to drop until the
/// body catches up with `pos`.
pub(crate) struct ChunkIter {
    client: WebdavClient,
    path: String,
    url: Url,
    chunk_size: usize,
    phase: Phase,
    pos: u64,
    pending: Bytes,
    discard: u64,
    reconnects: u32,
    accepts_ranges: bool,
    size: Option<u64>,
    content_type: Option<String>,
}

impl ChunkIter {
    /// Issue the first GET at `start`.
    pub(crate) async fn open(client: WebdavClient, path: &str, start: u64, chunk_size: usize) -> Result<Self> {
        let url = client.join_url(path);
        let mut iter = ChunkIter {
            client,
            path: path.to_string(),
            url,
            chunk_size: chunk_size.max(1),
            phase: Phase::Reconnecting,
            pos: start,
            pending: Bytes::new(),
            discard: 0,
            reconnects: 0,
            accepts_ranges: false,
            size: None,
            content_type: None,
        };
        iter.connect().await?;
        Ok(iter)
    }

    /// Total size reported by the first response.
    pub(crate) fn size(&self) -> Option<u64> {
        self.size
    }

    /// `Content-Type` of the first response.
    pub(crate) fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether a response advertised `Accept-Ranges: bytes`.
    pub(crate) fn accepts_ranges(&self) -> bool {
        self.accepts_ranges
    }

    async fn connect(&mut self) -> Result<()> {
        let mut headers = HeaderMap::new();
        if self.pos > 0 {
            let range = format_range_header(self.pos);
            let value = HeaderValue::from_str(&range).map_err(|_| ClientError::InvalidHeader(range))?;
            headers.insert(RANGE, value);
        }

        let response = self.client.http().get(self.url.clone(), headers).await?;
        if response.status_code() == 416 {
            // Range starts at or past the end of the resource.
            tracing::debug!("{} has no bytes at offset {}", self.url, self.pos);
            self.phase = Phase::Exhausted;
            return Ok(());
        }
        let response = check_status(response, &Method::GET, &self.url, &self.path)?;

        let full_body = response.status_code() == 200;
        self.discard = 0;
        if self.pos > 0 && full_body {
            tracing::warn!(
                "Server ignored Range for {} and answered 200 at offset {}; skipping to it",
                self.url,
                self.pos
            );
            self.discard = self.pos;
        }

        self.accepts_ranges |= response.accepts_ranges();
        if self.size.is_none() {
            self.size = match response.content_range() {
                Some(range) => range.total,
                None if self.pos == 0 || full_body => response.content_length(),
                None => response.content_length().map(|len| len + self.pos),
            };
        }
        if self.content_type.is_none() {
            self.content_type = response.content_type().map(str::to_string);
        }

        self.phase = Phase::Streaming(response);
        Ok(())
    }

    /// Decide whether a broken transfer may continue.
    async fn recover(&mut self, err: TransportError) -> Result<()> {
        let resumable = err.is_resumable()
            && (self.accepts_ranges || self.client.supports_ranges().await);
        if !resumable {
            self.phase = Phase::Exhausted;
            return Err(err.into());
        }
        if self.reconnects >= self.client.config().max_reconnects {
            self.phase = Phase::Exhausted;
            return Err(err.into());
        }

        self.reconnects += 1;
        if self.client.config().enable_logging {
            tracing::warn!(
                "Transfer of {} interrupted at byte {} (attempt {}), resuming: {}",
                self.url,
                self.pos,
                self.reconnects,
                err
            );
        }
        self.phase = Phase::Reconnecting;
        Ok(())
    }

    fn take_pending(&mut self) -> Bytes {
        let n = self.chunk_size.min(self.pending.len());
        self.pending.split_to(n)
    }

    /// Next chunk, or `None` once the resource is exhausted.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            if !self.pending.is_empty() {
                return Ok(Some(self.take_pending()));
            }

            match &mut self.phase {
                Phase::Exhausted => return Ok(None),
                Phase::Reconnecting => match self.connect().await {
                    Ok(()) => {}
                    Err(ClientError::Transport(err)) => self.recover(err).await?,
                    Err(err) => return Err(err),
                },
                Phase::Streaming(response) => match response.next_chunk().await {
                    Some(Ok(mut chunk)) => {
                        if self.discard > 0 {
                            let skip = self.discard.min(chunk.len() as u64);
                            self.discard -= skip;
                            let _ = chunk.split_to(skip as usize);
                        }
                        if chunk.is_empty() {
                            continue;
                        }
                        self.pos += chunk.len() as u64;
                        self.reconnects = 0;
                        self.pending = chunk;
                    }
                    Some(Err(err)) => self.recover(err).await?,
                    None => self.phase = Phase::Exhausted,
                },
            }
        }
    }
}
