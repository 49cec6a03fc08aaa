//! The streaming proxy pipeline
//!
//! One shared implementation serves both route families (the generic URL
//! proxy and the gated per-lecture proxy): authorization happens before this
//! pipeline runs, everything after it is identical. Per request: probe the
//! upstream size, open the streaming fetch, slice if the upstream ignored
//! the range, and synthesize exactly one response.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::fetch::UpstreamFetcher;
use crate::metrics::RelayMetrics;
use crate::models::RangeSpec;
use crate::probe::SizeProber;
use crate::range::{parse_range_header, resolve_window};
use crate::respond::{self, RelayBody};
use http::Response;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Orchestrates probe, fetch, slice, and synthesis for one upstream asset.
pub struct StreamPipeline {
    prober: SizeProber,
    fetcher: UpstreamFetcher,
    default_window: u64,
    metrics: Arc<RelayMetrics>,
}

impl StreamPipeline {
    pub fn new(client: Client, config: &RelayConfig, metrics: Arc<RelayMetrics>) -> Self {
        StreamPipeline {
            prober: SizeProber::new(client.clone(), config.probe_timeout()),
            fetcher: UpstreamFetcher::new(client, config.fetch_timeout()),
            default_window: config.default_window_bytes,
            metrics,
        }
    }

    /// Proxy `target_url` to the client, honoring the raw `Range` header
    /// value if one was supplied. The caller has already authorized the
    /// request.
    pub async fn proxy(
        &self,
        target_url: &str,
        range_header: Option<&str>,
    ) -> Result<Response<RelayBody>> {
        validate_target(target_url)?;

        // Malformed ranges degrade to a full-body transfer
        let range: Option<RangeSpec> = range_header.and_then(parse_range_header);
        self.metrics.record_request(range.is_some());

        info!(
            "Proxying url={} range={:?}",
            target_url,
            range.map(|r| r.to_header())
        );

        // Only range requests need the total size; probing must finish (or
        // fail over) before the main fetch starts.
        let probed_total = match range {
            Some(_) => self.prober.probe(target_url).await,
            None => None,
        };

        let upstream = match self.fetcher.open(target_url, range.as_ref()).await {
            Ok(upstream) => upstream,
            Err(e) => {
                self.metrics.record_upstream_failure();
                return Err(e);
            }
        };

        match range {
            None => {
                self.metrics.record_passthrough();
                respond::synthesize(upstream, None, None)
            }
            Some(spec) if upstream.info.is_range_cooperative() => {
                // Zero-copy fast path: the upstream already emits exactly
                // the requested window
                self.metrics.record_cooperative();
                respond::synthesize(upstream, Some(&spec), None)
            }
            Some(spec) => {
                let total = probed_total.or(upstream.info.content_length);
                debug!(
                    "Range-naive upstream for url={}, slicing with total={:?}",
                    target_url, total
                );
                let window = resolve_window(&spec, total, self.default_window)?;
                self.metrics.record_sliced();
                respond::synthesize(upstream, Some(&spec), Some(&window))
            }
        }
    }
}

/// The target must be an absolute http(s) URL before any connection is
/// attempted.
fn validate_target(target_url: &str) -> Result<()> {
    let parsed =
        Url::parse(target_url).map_err(|e| RelayError::InvalidUrl(format!("{}", e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(RelayError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}
