//! Server feature detection.
//!
//! Whether the server honours `Range` is probed once per client with an OPTIONS
//! request to the base URL and cached. Reads go through a `parking_lot::RwLock`
//! fast path; the probe itself runs under an async mutex so concurrent streams wait
//! for one answer instead of each sending their own OPTIONS.

use http::header::ACCEPT_RANGES;
use http::HeaderMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use url::Url;

use crate::client::verbs::DavHttpClient;
use crate::protocol::headers::accepts_byte_ranges;

/// Features detected on the server, shared by clones of a client.
#[derive(Debug, Default)]
pub struct DetectedFeatures {
    supports_ranges: RwLock<Option<bool>>,
    probe: Mutex<()>,
}

impl DetectedFeatures {
    /// Nothing detected yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded answer; `None` probes on first use.
    pub fn with_supports_ranges(supports_ranges: Option<bool>) -> Self {
        DetectedFeatures {
            supports_ranges: RwLock::new(supports_ranges),
            probe: Mutex::new(()),
        }
    }

    /// Cached answer without probing.
    pub fn cached_supports_ranges(&self) -> Option<bool> {
        *self.supports_ranges.read()
    }

    /// Override the cached answer.
    pub fn set_supports_ranges(&self, supports_ranges: bool) {
        *self.supports_ranges.write() = Some(supports_ranges);
    }

    /// Whether the server supports byte ranges, probing on first call.
    ///
    /// A failed probe counts as "no" and is not cached.
    pub async fn supports_ranges(&self, http: &DavHttpClient, base_url: &Url) -> bool {
        if let Some(known) = self.cached_supports_ranges() {
            return known;
        }

        let _guard = self.probe.lock().await;
        if let Some(known) = self.cached_supports_ranges() {
            return known;
        }

        match http.options(base_url.clone(), HeaderMap::new()).await {
            Ok(response) => {
                let detected = accepts_byte_ranges(response.header(ACCEPT_RANGES));
                tracing::debug!("{} supports ranges: {}", base_url, detected);
                self.set_supports_ranges(detected);
                detected
            }
            Err(e) => {
                tracing::warn!("Could not detect Range support on {}: {}", base_url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{HttpRequest, HttpResponse, Transport};
    use crate::error::TransportError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct OptionsServer {
        probes: AtomicU32,
        accept_ranges: Option<&'static str>,
    }

    #[async_trait]
    impl Transport for OptionsServer {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let mut headers = HeaderMap::new();
            if let Some(value) = self.accept_ranges {
                headers.insert(ACCEPT_RANGES, HeaderValue::from_static(value));
            }
            Ok(HttpResponse::from_bytes(StatusCode::OK, headers, Bytes::new()))
        }
    }

    fn setup(accept_ranges: Option<&'static str>) -> (Arc<OptionsServer>, DavHttpClient, Url) {
        let server = Arc::new(OptionsServer {
            probes: AtomicU32::new(0),
            accept_ranges,
        });
        let client = DavHttpClient::new(server.clone());
        (server, client, Url::parse("http://example.org/dav/").unwrap())
    }

    #[tokio::test]
    async fn test_probe_runs_once() {
        let (server, client, url) = setup(Some("bytes"));
        let features = Arc::new(DetectedFeatures::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let features = features.clone();
                let client = client.clone();
                let url = url.clone();
                tokio::spawn(async move { features.supports_ranges(&client, &url).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(server.probes.load(Ordering::SeqCst), 1);
        assert_eq!(features.cached_supports_ranges(), Some(true));
    }

    #[tokio::test]
    async fn test_no_accept_ranges_means_unsupported() {
        let (_, client, url) = setup(None);
        let features = DetectedFeatures::new();
        assert!(!features.supports_ranges(&client, &url).await);
        assert_eq!(features.cached_supports_ranges(), Some(false));
    }

    #[tokio::test]
    async fn test_preseeded_skips_probe() {
        let (server, client, url) = setup(Some("bytes"));
        let features = DetectedFeatures::with_supports_ranges(Some(false));
        assert!(!features.supports_ranges(&client, &url).await);
        assert_eq!(server.probes.load(Ordering::SeqCst), 0);
    }
}
