//! Upstream fetching
//!
//! Opens the real data transfer to the origin, forwarding the client's range
//! when present (best-effort - the origin may ignore it), and classifies the
//! origin's cooperation level so the pipeline knows whether slicing is
//! needed. A single attempt per request: video assets are large and blind
//! retries would duplicate cost and latency.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::models::{RangeSpec, UpstreamInfo};
use bytes::Bytes;
use futures_util::Stream;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Boxed upstream body stream, pinned so it can be wrapped by the slicer.
pub type UpstreamBody = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// An open upstream transfer: classified headers plus the live byte stream.
pub struct FetchedUpstream {
    pub info: UpstreamInfo,
    pub body: UpstreamBody,
}

impl std::fmt::Debug for FetchedUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedUpstream")
            .field("info", &self.info)
            .field("body", &"<stream>")
            .finish()
    }
}

/// Build the shared HTTP client used for probes, fetches, and manifest
/// requests. Connection pooling and TCP_NODELAY keep per-request latency
/// down; per-call deadlines are applied by the callers, not here, because a
/// client-wide timeout would also bound long body transfers.
pub fn build_client(config: &RelayConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(Policy::limited(config.max_redirects))
        .connect_timeout(Duration::from_secs(config.probe_timeout_secs))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| RelayError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// Opens streaming connections to upstream resources.
pub struct UpstreamFetcher {
    client: Client,
    fetch_timeout: Duration,
}

impl UpstreamFetcher {
    pub fn new(client: Client, fetch_timeout: Duration) -> Self {
        UpstreamFetcher {
            client,
            fetch_timeout,
        }
    }

    /// Open the upstream transfer.
    ///
    /// The fetch timeout bounds the wait for response headers only - the
    /// body stream that follows is paced by the client reading it.
    pub async fn open(&self, url: &str, range: Option<&RangeSpec>) -> Result<FetchedUpstream> {
        let mut request = self.client.get(url).header("Accept", "video/*");

        if let Some(range) = range {
            let header = range.to_header();
            debug!("Forwarding range upstream: {} for url={}", header, url);
            request = request.header("Range", header);
        }

        let response = tokio::time::timeout(self.fetch_timeout, request.send())
            .await
            .map_err(|_| {
                warn!("Upstream fetch timed out for url={}", url);
                RelayError::UpstreamTimeout
            })?
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!("Upstream returned status {} for url={}", status, url);
            return Err(RelayError::UpstreamStatus(status.as_u16()));
        }

        let headers = response.headers();

        let content_type = sanitize_content_type(
            headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
        );

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let content_range = headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let info = UpstreamInfo {
            status: status.as_u16(),
            content_type,
            content_length,
            content_range,
        };

        info!(
            "Upstream open for url={}: status={}, cooperative={}, content_length={:?}",
            url,
            info.status,
            info.is_range_cooperative(),
            info.content_length
        );

        Ok(FetchedUpstream {
            info,
            body: Box::pin(response.bytes_stream()),
        })
    }
}

/// Misconfigured origins sometimes label binary video payloads as text,
/// which makes browsers refuse playback. Override any `text/*` type (and an
/// absent one) with a binary video type.
pub fn sanitize_content_type(content_type: &str) -> String {
    let trimmed = content_type.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with("text/") {
        "video/mp4".to_string()
    } else {
        trimmed.to_string()
    }
}

fn classify_transport_error(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::UpstreamTimeout
    } else if err.is_connect() {
        RelayError::UpstreamConnect(err.to_string())
    } else {
        RelayError::Stream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_overrides_text_types() {
        assert_eq!(sanitize_content_type("text/plain"), "video/mp4");
        assert_eq!(
            sanitize_content_type("Text/HTML; charset=utf-8"),
            "video/mp4"
        );
        assert_eq!(sanitize_content_type(""), "video/mp4");
    }

    #[test]
    fn test_sanitize_keeps_binary_types() {
        assert_eq!(sanitize_content_type("video/webm"), "video/webm");
        assert_eq!(
            sanitize_content_type("application/octet-stream"),
            "application/octet-stream"
        );
        assert_eq!(sanitize_content_type(" video/mp2t "), "video/mp2t");
    }

    #[tokio::test]
    async fn test_connect_failure_maps_to_upstream_error() {
        let fetcher = UpstreamFetcher::new(Client::new(), Duration::from_millis(300));
        let err = fetcher
            .open("http://192.0.2.1:9/video.mp4", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::UpstreamConnect(_) | RelayError::UpstreamTimeout
        ));
    }
}
