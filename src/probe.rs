//! Upstream size probing
//!
//! Determines the total byte length of an upstream resource without
//! downloading it. Two strategies, first success wins: a HEAD request, then
//! a minimal `bytes=0-0` ranged GET whose `Content-Range` trailer carries
//! the total. Probe failures are never surfaced to the caller - an origin
//! that refuses both probes simply leaves the total unknown and downstream
//! components degrade to bounded-guess windows.

use crate::range::content_range_total;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Probes origin servers for resource sizes using lightweight requests.
pub struct SizeProber {
    client: Client,
    timeout: Duration,
}

impl SizeProber {
    /// Create a prober sharing the relay's HTTP client. The timeout is
    /// deliberately independent of (and shorter than) the main fetch
    /// timeout so a slow origin cannot stall the pipeline.
    pub fn new(client: Client, timeout: Duration) -> Self {
        SizeProber { client, timeout }
    }

    /// Determine the total size of the resource at `url`, or `None` when the
    /// origin does not cooperate with either probe.
    pub async fn probe(&self, url: &str) -> Option<u64> {
        if let Some(total) = self.head_probe(url).await {
            debug!("HEAD probe resolved size for url={}: {}", url, total);
            return Some(total);
        }

        if let Some(total) = self.range_probe(url).await {
            debug!("Range probe resolved size for url={}: {}", url, total);
            return Some(total);
        }

        debug!("Size probes exhausted for url={}, total unknown", url);
        None
    }

    /// HEAD request; reads Content-Length from the response headers.
    async fn head_probe(&self, url: &str) -> Option<u64> {
        let response = tokio::time::timeout(self.timeout, self.client.head(url).send())
            .await
            .ok()?
            .ok()?;

        if !response.status().is_success() {
            debug!(
                "HEAD probe got status {} for url={}",
                response.status(),
                url
            );
            return None;
        }

        response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
    }

    /// `bytes=0-0` GET; parses the total out of the `Content-Range` trailer
    /// (`bytes 0-0/<total>`). The one-byte body is dropped unread.
    async fn range_probe(&self, url: &str) -> Option<u64> {
        let request = self.client.get(url).header("Range", "bytes=0-0");

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .ok()?
            .ok()?;

        if !response.status().is_success() {
            debug!(
                "Range probe got status {} for url={}",
                response.status(),
                url
            );
            return None;
        }

        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
    }
}
