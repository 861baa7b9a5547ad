//! Delimiter splitting and text-mode reads.

use bytes::Bytes;

use crate::error::Result;
use crate::stream::resumable::ResumableStream;

/// Offset of the first `delimiter` in `haystack`.
pub fn find_delimiter(haystack: &[u8], delimiter: &[u8]) -> Option<usize> {
    if delimiter.is_empty() || haystack.len() < delimiter.len() {
        return None;
    }
    haystack
        .windows(delimiter.len())
        .position(|window| window == delimiter)
}

/// Split `chunk` after the first `delimiter`.
///
/// Returns the part up to and including the delimiter and the remainder, or the
/// whole chunk and `None` when the delimiter does not occur.
///
/// ```
/// use bytes::Bytes;
/// use webdav_http::stream::split_chunk;
///
/// let (line, rest) = split_chunk(Bytes::from_static(b"a\nb"), b"\n");
/// assert_eq!(line, "a\n");
/// assert_eq!(rest.unwrap(), "b");
/// ```
pub fn split_chunk(chunk: Bytes, delimiter: &[u8]) -> (Bytes, Option<Bytes>) {
    match find_delimiter(&chunk, delimiter) {
        Some(found) => {
            let mut head = chunk;
            let rest = head.split_off(found + delimiter.len());
            (head, Some(rest))
        }
        None => (chunk, None),
    }
}

/// UTF-8 text view of a [`ResumableStream`].
#[derive(Debug)]
pub struct TextStream {
    inner: ResumableStream,
}

impl TextStream {
    pub fn new(inner: ResumableStream) -> Self {
        TextStream { inner }
    }

    /// Next line including its `\n`; `None` at the end of the file.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let line = self.inner.read_until(b"\n").await?;
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8(line.to_vec())?))
    }

    /// All remaining lines, without their line endings.
    pub async fn lines(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line().await? {
            let trimmed = line.strip_suffix('\n').unwrap_or(&line);
            let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
            lines.push(trimmed.to_string());
        }
        Ok(lines)
    }

    /// The rest of the file.
    pub async fn read_to_string(&mut self) -> Result<String> {
        let data = self.inner.read_all().await?;
        Ok(String::from_utf8(data.to_vec())?)
    }

    pub fn get_ref(&self) -> &ResumableStream {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut ResumableStream {
        &mut self.inner
    }

    pub fn into_inner(self) -> ResumableStream {
        self.inner
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}
