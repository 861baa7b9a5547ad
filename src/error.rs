//! Error types for the WebDAV client.
//!
//! Every public operation returns [`Result`], whose error side is [`ClientError`].
//! The variants follow the failure taxonomy of the client:
//!
//! | Kind | Variants |
//! |------|----------|
//! | Transport | [`ClientError::Transport`] |
//! | Protocol status | [`ClientError::NotFound`], [`ClientError::InsufficientStorage`], [`ClientError::BadGateway`], [`ClientError::Http`] |
//! | Multistatus partial failure | [`ClientError::MultiStatus`] |
//! | Semantic | [`ClientError::AlreadyExists`], [`ClientError::Locked`], [`ClientError::Forbidden`], [`ClientError::Conflict`] |
//! | Local precondition | [`ClientError::Seek`], [`ClientError::IsACollection`], [`ClientError::StreamClosed`] |
//!
//! Transport errors are retried inside the stream engine when the server supports
//! byte ranges; everything else reaches the caller with the path or status involved.

use std::collections::BTreeMap;
use std::fmt;

use http::Method;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request or a body read timed out.
    Timeout,
    /// Connection refused, reset, or dropped mid-body.
    Network,
    /// Anything else the HTTP layer reported (invalid request, redirect loop, ...).
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => f.write_str("timeout"),
            TransportErrorKind::Network => f.write_str("network"),
            TransportErrorKind::Other => f.write_str("transport"),
        }
    }
}

/// Failure reported by a [`Transport`](crate::client::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Create a transport error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A timeout while sending or reading.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// A dropped or refused connection.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// Any other transport failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Kind of failure.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a byte stream interrupted by this error may be resumed with a Range request.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout | TransportErrorKind::Network
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
            TransportErrorKind::Network
        } else {
            TransportErrorKind::Other
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Operation during which a multistatus response reported failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// MOVE
    Move,
    /// COPY
    Copy,
    /// DELETE
    Remove,
    /// MKCOL
    Mkdir,
    /// PUT
    Upload,
    /// Any other request.
    Request,
}

impl Operation {
    /// Operation a request method stands for.
    pub fn from_method(method: &Method) -> Self {
        match method.as_str() {
            "MOVE" => Operation::Move,
            "COPY" => Operation::Copy,
            "DELETE" => Operation::Remove,
            "MKCOL" => Operation::Mkdir,
            "PUT" => Operation::Upload,
            _ => Operation::Request,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Remove => "remove",
            Operation::Mkdir => "mkdir",
            Operation::Upload => "upload",
            Operation::Request => "request",
        };
        f.write_str(name)
    }
}

/// One or more resources inside a 207 response failed.
///
/// `statuses` maps the raw `href` of each failing resource to its reason phrase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MultiStatusResponseError {
    statuses: BTreeMap<String, String>,
    message: String,
}

impl MultiStatusResponseError {
    /// Build the error from the failing statuses. The map must not be empty.
    pub fn new(statuses: BTreeMap<String, String>) -> Self {
        let message = match statuses.iter().next() {
            Some((path, reason)) if statuses.len() == 1 => {
                format!("The resource {} is {}", path, reason.to_lowercase())
            }
            _ => format!("multiple errors received: {:?}", statuses),
        };
        Self { statuses, message }
    }

    /// Failing resources and their reason phrases.
    pub fn statuses(&self) -> &BTreeMap<String, String> {
        &self.statuses
    }
}

/// Errors while decoding a multistatus body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Body is not well-formed XML.
    #[error("invalid multistatus xml: {0}")]
    Xml(String),
    /// A `<response>` without `<href>`.
    #[error("multistatus response without href")]
    MissingHref,
    /// A `<status>` line without a numeric code.
    #[error("invalid status line: {0}")]
    InvalidStatus(String),
    /// Tried to parse a response that is not 207 Multi-Status.
    #[error("http response is not a multistatus response (got {0})")]
    NotMultiStatus(u16),
}

/// Invalid seek on a [`ResumableStream`](crate::stream::ResumableStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SeekError {
    /// The resulting position would be negative.
    #[error("Seek before start of file")]
    BeforeStart,
    /// Seeking relative to the end with an unknown size.
    #[error("cannot seek to the end of file")]
    UnknownSize,
    /// Repositioning needs Range support that the server does not advertise.
    #[error("server does not support ranges")]
    RangesUnsupported,
}

/// Main error type of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Timeout or network failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 404 for the given path.
    #[error("The resource {path} could not be found in the server")]
    NotFound { path: String },

    /// 507 for the given path.
    #[error("Insufficient Storage on the server (while writing {path})")]
    InsufficientStorage { path: String },

    /// 502 from a gateway or the COPY/MOVE destination server.
    #[error("The destination server may have refused to accept the resource")]
    BadGateway,

    /// Any other 4xx/5xx response.
    #[error("received {status} ({reason}) for {method} {url}")]
    Http {
        status: u16,
        reason: String,
        method: Method,
        url: String,
    },

    /// A 207 response in which some resources failed.
    #[error("{operation} failed: {source}")]
    MultiStatus {
        operation: Operation,
        #[source]
        source: MultiStatusResponseError,
    },

    /// Target exists (412 on COPY/MOVE, 405 on MKCOL, or checked before upload).
    #[error("The resource {path} already exists")]
    AlreadyExists { path: String },

    /// 423.
    #[error("{0}")]
    Locked(String),

    /// 403.
    #[error("{0}")]
    Forbidden(String),

    /// 409.
    #[error("{0}")]
    Conflict(String),

    /// Attempted to open a collection as a file.
    #[error("Cannot open a collection: {path}")]
    IsACollection { path: String },

    /// Invalid seek.
    #[error(transparent)]
    Seek(#[from] SeekError),

    /// Read or seek on a closed stream.
    #[error("I/O operation on closed stream")]
    StreamClosed,

    /// Multistatus body could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A multistatus response holds no record for a path the caller requested.
    #[error("no response for {path} in the multistatus body")]
    MissingResponse { path: String },

    /// Success status other than the ones the operation accepts.
    #[error("unexpected status {status} for {operation}")]
    UnexpectedStatus { status: u16, operation: Operation },

    /// Base URL or destination could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Header value could not be encoded.
    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    /// Local I/O while uploading or downloading.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Text mode read of a body that is not UTF-8.
    #[error("response is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl ClientError {
    /// HTTP status behind the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::NotFound { .. } => Some(404),
            ClientError::InsufficientStorage { .. } => Some(507),
            ClientError::BadGateway => Some(502),
            ClientError::Http { status, .. } => Some(*status),
            ClientError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Whether the error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
