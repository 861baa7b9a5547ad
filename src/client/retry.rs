//! Retry with exponential backoff.
//!
//! A failed operation is retried when its error belongs to the retryable classes
//! *and* passes the status predicate. The façade retries:
//!
//! | Error | Retried when |
//! |-------|--------------|
//! | [`ClientError::Locked`] | always |
//! | [`ClientError::BadGateway`] | always |
//! | [`ClientError::Http`] | status is 429, 500, 503, 504 or 509 |
//!
//! Everything else (404, transport failures, parse errors, ...) is returned at once.
//! Only idempotent requests go through the policy ([`is_idempotent`]); MOVE, MKCOL,
//! LOCK and POST are sent once.
//!
//! # Examples
//!
//! ```
//! use webdav_http::client::{exponential_backoff, is_retryable_status};
//! use std::time::Duration;
//!
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//! assert_eq!(exponential_backoff(2, 100), Duration::from_millis(400));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tokio::time::sleep;

use crate::client::config::ClientConfig;
use crate::error::ClientError;
use crate::protocol::constants::BANDWIDTH_LIMIT_EXCEEDED;

/// Check if status code indicates a retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 503 | 504) || status == BANDWIDTH_LIMIT_EXCEEDED.0
}

/// Exponential backoff delay calculation
///
/// `base_ms * 2^attempt`, with the exponent capped at 10.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// Error classes the façade retries.
pub fn is_retryable_error(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Locked(_) | ClientError::BadGateway | ClientError::Http { .. }
    )
}

/// Predicate applied to retryable errors.
pub fn should_retry(err: &ClientError) -> bool {
    match err {
        ClientError::Http { status, .. } => is_retryable_status(*status),
        _ => true,
    }
}

/// Whether repeating `method` leaves the server as a single success would.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        method.as_str(),
        "GET" | "HEAD" | "OPTIONS" | "PUT" | "DELETE" | "PROPFIND" | "PROPPATCH" | "COPY" | "UNLOCK"
    )
}

type Backoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How often and how patiently to retry an operation.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    enable_logging: bool,
}

impl RetryPolicy {
    /// Up to `max_attempts` calls (at least one), one second base backoff.
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(|attempt| exponential_backoff(attempt, 1000)),
            enable_logging: true,
        }
    }

    /// A single attempt.
    pub fn disabled() -> Self {
        Self::new(1)
    }

    /// Policy described by a client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        let base_ms = config.retry_delay_ms;
        Self::new(config.attempts())
            .with_backoff(move |attempt| exponential_backoff(attempt, base_ms))
            .with_logging(config.enable_logging)
    }

    /// Replace the delay function. It receives the 0-based number of the failed attempt.
    pub fn with_backoff(mut self, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Log each retry at `warn`.
    pub fn with_logging(mut self, enable_logging: bool) -> Self {
        self.enable_logging = enable_logging;
        self
    }

    /// Maximum number of calls.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Call `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut, R, P>(&self, mut op: F, retryable: R, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if attempt + 1 < self.max_attempts && retryable(&e) && should_retry(&e) =>
                {
                    let delay = (self.backoff)(attempt);
                    if self.enable_logging {
                        tracing::warn!(
                            "Request failed (attempt {}), retrying after {:?}: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("enable_logging", &self.enable_logging)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http_error(status: u16) -> ClientError {
        ClientError::Http {
            status,
            reason: String::new(),
            method: Method::GET,
            url: "http://example.org/".to_string(),
        }
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_backoff(|_| Duration::ZERO)
    }

    #[test]
    fn test_is_retryable_status() {
        for status in [429, 500, 503, 504, 509] {
            assert!(is_retryable_status(status), "{}", status);
        }
        for status in [400, 404, 423, 501, 502] {
            assert!(!is_retryable_status(status), "{}", status);
        }
    }

    #[test]
    fn test_is_idempotent() {
        for name in ["GET", "PUT", "DELETE", "PROPFIND", "COPY", "OPTIONS"] {
            assert!(is_idempotent(&Method::from_bytes(name.as_bytes()).unwrap()), "{}", name);
        }
        for name in ["MOVE", "MKCOL", "LOCK", "POST"] {
            assert!(!is_idempotent(&Method::from_bytes(name.as_bytes()).unwrap()), "{}", name);
        }
    }

    #[test]
    fn test_exponential_backoff() {
        assert_eq!(exponential_backoff(0, 1000), Duration::from_secs(1));
        assert_eq!(exponential_backoff(1, 1000), Duration::from_secs(2));
        assert_eq!(exponential_backoff(30, 1), exponential_backoff(10, 1));
    }

    #[test]
    fn test_error_classes() {
        assert!(is_retryable_error(&ClientError::BadGateway));
        assert!(is_retryable_error(&ClientError::Locked("locked".into())));
        assert!(is_retryable_error(&http_error(500)));
        assert!(!is_retryable_error(&ClientError::NotFound { path: "/a".into() }));

        assert!(should_retry(&ClientError::BadGateway));
        assert!(should_retry(&http_error(503)));
        assert!(!should_retry(&http_error(400)));
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), ClientError> = instant(3)
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(http_error(503))
                },
                is_retryable_error,
                should_retry,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), ClientError> = instant(3)
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(http_error(400))
                },
                is_retryable_error,
                should_retry,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let calls = &AtomicU32::new(0);
        let result = instant(3)
            .run(
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ClientError::BadGateway)
                    } else {
                        Ok("done")
                    }
                },
                is_retryable_error,
                should_retry,
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_runs_once() {
        let calls = &AtomicU32::new(0);
        let _ = RetryPolicy::disabled()
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClientError::BadGateway)
                },
                is_retryable_error,
                should_retry,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
