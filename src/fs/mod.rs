//! Filesystem view of a WebDAV server.
//!
//! [`WebdavFileSystem`] adapts [`WebdavClient`] to the [`FileSystem`] trait used by
//! tooling that works on hierarchical filesystems. Client errors are translated into
//! the conventional filesystem errors:
//!
//! | Client error | [`FsError`] |
//! |--------------|-------------|
//! | [`ClientError::NotFound`] | [`FsError::NotFound`] |
//! | [`ClientError::AlreadyExists`] | [`FsError::AlreadyExists`] |
//! | [`ClientError::IsACollection`] | [`FsError::IsADirectory`] |
//! | anything else | [`FsError::Client`] |
//!
//! Directory semantics follow the usual conventions: `rmdir` refuses non-empty
//! directories, recursive `rm`/`copy`/`mv` of a directory is a single server-side
//! request, and `mkdir` creates missing ancestors.
//!
//! # Examples
//!
//! ```ignore
//! use webdav_http::fs::{FileSystem, WebdavFileSystem};
//!
//! let fs = WebdavFileSystem::connect("https://example.org/dav/", Default::default())?;
//! fs.makedirs("reports/2024", true).await?;
//! fs.pipe_file("reports/2024/q1.csv", "a,b\n1,2\n".into()).await?;
//! assert_eq!(fs.size("reports/2024/q1.csv").await?, Some(8));
//! ```

mod file;

use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::client::{ClientConfig, ResourceInfo, WebdavClient};
use crate::error::ClientError;
use crate::protocol::headers::Depth;
use crate::protocol::urls;

pub use file::{WebdavFile, WebdavWriteFile};

/// Filesystem errors.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Any other client failure, unchanged.
    #[error(transparent)]
    Client(ClientError),
}

impl From<ClientError> for FsError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound { path } => FsError::NotFound(path),
            ClientError::AlreadyExists { path } => FsError::AlreadyExists(path),
            ClientError::IsACollection { path } => FsError::IsADirectory(path),
            err => FsError::Client(err),
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        let kind = match &err {
            FsError::NotFound(_) => io::ErrorKind::NotFound,
            FsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            FsError::Unsupported(_) => io::ErrorKind::Unsupported,
            FsError::Client(ClientError::Io(e)) => e.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::Client(ClientError::Io(err))
    }
}

/// Result type of filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Parent of a slash-separated path; empty for top-level names.
pub(crate) fn parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((head, _)) => head.to_string(),
        None => String::new(),
    }
}

fn is_root(path: &str) -> bool {
    path.trim_matches('/').is_empty()
}

/// Hierarchical filesystem operations.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Handle returned by [`open_read`](Self::open_read).
    type Reader: Send;
    /// Handle returned by [`open_write`](Self::open_write).
    type Writer: Send;

    /// Entries of a directory.
    async fn ls(&self, path: &str) -> FsResult<Vec<ResourceInfo>>;

    /// Names of the entries of a directory.
    async fn ls_names(&self, path: &str) -> FsResult<Vec<String>> {
        Ok(self.ls(path).await?.into_iter().map(|info| info.name).collect())
    }

    async fn info(&self, path: &str) -> FsResult<ResourceInfo>;

    async fn exists(&self, path: &str) -> FsResult<bool>;

    /// Whether `path` is a directory; `false` when it does not exist.
    async fn isdir(&self, path: &str) -> FsResult<bool> {
        match self.info(path).await {
            Ok(info) => Ok(info.is_dir()),
            Err(FsError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether `path` is a file; `false` when it does not exist.
    async fn isfile(&self, path: &str) -> FsResult<bool> {
        match self.info(path).await {
            Ok(info) => Ok(!info.is_dir()),
            Err(FsError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn rm_file(&self, path: &str) -> FsResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &str) -> FsResult<()>;

    /// Remove a file, or a directory tree when `recursive`.
    async fn rm(&self, path: &str, recursive: bool) -> FsResult<()>;

    async fn cp_file(&self, from: &str, to: &str) -> FsResult<()>;

    async fn copy(&self, from: &str, to: &str, recursive: bool) -> FsResult<()>;

    async fn mv(&self, from: &str, to: &str, recursive: bool) -> FsResult<()>;

    /// Create a directory, with its ancestors when `create_parents`.
    async fn mkdir(&self, path: &str, create_parents: bool) -> FsResult<()>;

    /// Create a directory and all missing ancestors.
    async fn makedirs(&self, path: &str, exist_ok: bool) -> FsResult<()>;

    async fn created(&self, path: &str) -> FsResult<Option<DateTime<FixedOffset>>>;

    async fn modified(&self, path: &str) -> FsResult<Option<DateTime<FixedOffset>>>;

    async fn size(&self, path: &str) -> FsResult<Option<u64>>;

    /// Opaque content fingerprint.
    async fn checksum(&self, path: &str) -> FsResult<Option<String>>;

    /// Write `data` to a file, replacing it.
    async fn pipe_file(&self, path: &str, data: Bytes) -> FsResult<()>;

    /// Whole content of a file.
    async fn cat_file(&self, path: &str) -> FsResult<Bytes>;

    /// Upload a local file or create a local directory's counterpart.
    async fn put_file(&self, local: &Path, remote: &str) -> FsResult<()>;

    /// Download a file, or create the local directory for a remote one.
    async fn get_file(&self, remote: &str, local: &Path) -> FsResult<()>;

    /// Create an empty file, truncating an existing one when `truncate`.
    async fn touch(&self, path: &str, truncate: bool) -> FsResult<()>;

    async fn open_read(&self, path: &str) -> FsResult<Self::Reader>;

    async fn open_write(&self, path: &str) -> FsResult<Self::Writer>;
}

/// [`FileSystem`] over a [`WebdavClient`].
#[derive(Debug, Clone)]
pub struct WebdavFileSystem {
    client: WebdavClient,
}

impl WebdavFileSystem {
    pub fn new(client: WebdavClient) -> Self {
        WebdavFileSystem { client }
    }

    /// Filesystem over a new `reqwest` client.
    pub fn connect(base_url: &str, config: ClientConfig) -> FsResult<Self> {
        Ok(Self::new(WebdavClient::with_config(base_url, config)?))
    }

    pub fn client(&self) -> &WebdavClient {
        &self.client
    }

    /// Single MKCOL with filesystem-flavoured errors.
    ///
    /// A 405 is resolved by looking at what exists at `path`; a 409 by looking at the
    /// parent, which is either missing or not a directory.
    async fn mkdir_one(&self, path: &str, exist_ok: bool) -> FsResult<()> {
        match self.client.mkdir(path, false).await {
            Ok(()) => Ok(()),
            Err(ClientError::AlreadyExists { .. }) => {
                let info = self.info(path).await?;
                if info.is_dir() && exist_ok {
                    Ok(())
                } else {
                    Err(FsError::AlreadyExists(path.to_string()))
                }
            }
            Err(ClientError::Conflict(message)) => {
                let parent = parent(path);
                let info = self.info(&parent).await?;
                if info.is_dir() {
                    Err(FsError::Client(ClientError::Conflict(message)))
                } else {
                    Err(FsError::NotADirectory(parent))
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl FileSystem for WebdavFileSystem {
    type Reader = WebdavFile;
    type Writer = WebdavWriteFile;

    async fn ls(&self, path: &str) -> FsResult<Vec<ResourceInfo>> {
        if !self.client.isdir(path).await? {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        // An empty collection lists as itself.
        let own = urls::normalize(path.trim_matches('/'));
        Ok(self
            .client
            .ls(path)
            .await?
            .into_iter()
            .filter(|info| info.name.trim_matches('/') != own)
            .collect())
    }

    async fn info(&self, path: &str) -> FsResult<ResourceInfo> {
        Ok(self.client.info(path).await?)
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        Ok(self.client.exists(path).await?)
    }

    async fn rm_file(&self, path: &str) -> FsResult<()> {
        Ok(self.client.remove(path).await?)
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        if !self.ls(path).await?.is_empty() {
            return Err(FsError::DirectoryNotEmpty(path.to_string()));
        }
        self.rm_file(path).await
    }

    async fn rm(&self, path: &str, recursive: bool) -> FsResult<()> {
        if !recursive && self.isdir(path).await? {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        // DELETE on a collection removes the whole tree.
        self.rm_file(path).await
    }

    async fn cp_file(&self, from: &str, to: &str) -> FsResult<()> {
        Ok(self.client.copy(from, to, Depth::Infinity, false).await?)
    }

    async fn copy(&self, from: &str, to: &str, recursive: bool) -> FsResult<()> {
        if self.isdir(from).await? {
            if recursive {
                return self.cp_file(from, to).await;
            }
            return self.makedirs(to, false).await;
        }
        self.cp_file(from, to).await
    }

    async fn mv(&self, from: &str, to: &str, recursive: bool) -> FsResult<()> {
        if !recursive && self.isdir(from).await? {
            return self.makedirs(to, false).await;
        }
        Ok(self.client.move_(from, to, false).await?)
    }

    async fn mkdir(&self, path: &str, create_parents: bool) -> FsResult<()> {
        if create_parents {
            return self.makedirs(path, true).await;
        }
        self.mkdir_one(path, false).await
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> FsResult<()> {
        let mut missing = Vec::new();
        let mut current = parent(path);
        while !is_root(&current) && !self.exists(&current).await? {
            let next = parent(&current);
            missing.push(current);
            current = next;
        }
        for dir in missing.iter().rev() {
            self.mkdir_one(dir, exist_ok).await?;
        }
        self.mkdir_one(path, exist_ok).await
    }

    async fn created(&self, path: &str) -> FsResult<Option<DateTime<FixedOffset>>> {
        Ok(self.client.created(path).await?)
    }

    async fn modified(&self, path: &str) -> FsResult<Option<DateTime<FixedOffset>>> {
        Ok(self.client.modified(path).await?)
    }

    async fn size(&self, path: &str) -> FsResult<Option<u64>> {
        Ok(self.client.content_length(path).await?)
    }

    async fn checksum(&self, path: &str) -> FsResult<Option<String>> {
        Ok(self.client.etag(path).await?)
    }

    async fn pipe_file(&self, path: &str, data: Bytes) -> FsResult<()> {
        Ok(self.client.put_bytes(path, data, true).await?)
    }

    async fn cat_file(&self, path: &str) -> FsResult<Bytes> {
        let mut file = self.open_read(path).await?;
        let data = file.read_all().await?;
        file.close();
        Ok(data)
    }

    async fn put_file(&self, local: &Path, remote: &str) -> FsResult<()> {
        if tokio::fs::metadata(local).await?.is_dir() {
            return self.makedirs(remote, true).await;
        }
        let parent = parent(remote);
        if !is_root(&parent) {
            self.makedirs(&parent, true).await?;
        }
        Ok(self.client.upload_file(local, remote, true, None).await?)
    }

    async fn get_file(&self, remote: &str, local: &Path) -> FsResult<()> {
        if self.isdir(remote).await? {
            tokio::fs::create_dir_all(local).await?;
            return Ok(());
        }
        self.client.download_file(remote, local, None).await?;
        Ok(())
    }

    async fn touch(&self, path: &str, truncate: bool) -> FsResult<()> {
        if truncate || !self.exists(path).await? {
            return Ok(self.client.put_bytes(path, Bytes::new(), true).await?);
        }
        Err(FsError::Unsupported(format!(
            "updating the modification time of {}",
            path
        )))
    }

    async fn open_read(&self, path: &str) -> FsResult<WebdavFile> {
        let stream = self.client.open(path).await?;
        Ok(WebdavFile::new(stream))
    }

    async fn open_write(&self, path: &str) -> FsResult<WebdavWriteFile> {
        if self.isdir(path).await? {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        Ok(WebdavWriteFile::new(self.client.clone(), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent() {
        assert_eq!(parent("a/b/c"), "a/b");
        assert_eq!(parent("a/b/"), "a");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("a"), "");
        assert!(is_root(&parent("a")));
        assert!(is_root(&parent("/a")));
    }

    #[test]
    fn test_client_error_translation() {
        let err: FsError = ClientError::NotFound { path: "/x".into() }.into();
        assert!(matches!(err, FsError::NotFound(ref p) if p == "/x"));

        let err: FsError = ClientError::IsACollection { path: "/d".into() }.into();
        assert!(matches!(err, FsError::IsADirectory(_)));

        let err: FsError = ClientError::BadGateway.into();
        assert!(matches!(err, FsError::Client(ClientError::BadGateway)));
    }

    #[test]
    fn test_io_error_kinds() {
        let err: io::Error = FsError::NotFound("/x".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = FsError::AlreadyExists("/x".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        let err: io::Error = FsError::Unsupported("touch".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(err.to_string().contains("touch"));
    }
}
