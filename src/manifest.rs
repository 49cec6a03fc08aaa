//! HLS manifest rewriting
//!
//! A playlist handed straight to the player would make it fetch segments
//! directly from the origin, bypassing the relay. This module fetches the
//! playlist as text (playlists are small), resolves every URI reference -
//! segment lines and `URI="..."` attributes inside tags - against the
//! playlist's own base URL, and replaces each with a proxied reference back
//! into the relay's byte-range endpoint. A bare transport-stream segment is
//! wrapped in a synthesized single-segment playlist so players that expect a
//! manifest can still consume it.

use crate::error::{RelayError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Content type served for all rewritten and synthesized playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Rewrites HLS playlists to route every sub-resource through the relay.
pub struct ManifestRewriter {
    client: Client,
    probe_timeout: Duration,
    fetch_timeout: Duration,
    public_prefix: String,
}

impl ManifestRewriter {
    pub fn new(
        client: Client,
        probe_timeout: Duration,
        fetch_timeout: Duration,
        public_prefix: String,
    ) -> Self {
        ManifestRewriter {
            client,
            probe_timeout,
            fetch_timeout,
            public_prefix,
        }
    }

    /// Produce the playlist text to serve for `target_url`.
    ///
    /// Playlist upstreams are fetched and rewritten; bare `.ts` segments get
    /// a synthesized wrapper; anything else is rejected with an
    /// unsupported-source failure (415) - the rewriter does not guess
    /// formats it cannot parse.
    pub async fn rewrite_for(&self, target_url: &str) -> Result<String> {
        let content_type = self.probe_content_type(target_url).await;

        if is_playlist(&content_type, target_url) {
            let body = self.fetch_playlist(target_url).await?;
            let base = Url::parse(target_url)
                .map_err(|e| RelayError::InvalidUrl(format!("{}: {}", target_url, e)))?;
            info!("Rewriting playlist for url={}", target_url);
            return Ok(rewrite_playlist(&body, &base, &self.public_prefix));
        }

        if is_segment(&content_type, target_url) {
            info!("Synthesizing playlist around segment url={}", target_url);
            return Ok(synthesize_segment_playlist(target_url, &self.public_prefix));
        }

        Err(RelayError::UnsupportedSource(if content_type.is_empty() {
            "unknown".to_string()
        } else {
            content_type
        }))
    }

    /// HEAD the upstream to learn its content type. Failures are swallowed -
    /// detection falls back to the URL suffix.
    async fn probe_content_type(&self, url: &str) -> String {
        let response = match tokio::time::timeout(self.probe_timeout, self.client.head(url).send())
            .await
        {
            Ok(Ok(response)) => response,
            _ => {
                debug!("Content-type probe failed for url={}", url);
                return String::new();
            }
        };

        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    }

    async fn fetch_playlist(&self, url: &str) -> Result<String> {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.apple.mpegurl, */*");

        let response = tokio::time::timeout(self.fetch_timeout, request.send())
            .await
            .map_err(|_| RelayError::UpstreamTimeout)?
            .map_err(|e| {
                if e.is_connect() {
                    RelayError::UpstreamConnect(e.to_string())
                } else {
                    RelayError::Stream(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::UpstreamStatus(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| RelayError::Stream(format!("Failed to read playlist: {}", e)))
    }
}

/// Whether the upstream asset is an HLS playlist, by content type or URL
/// suffix.
pub fn is_playlist(content_type: &str, url: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("application/vnd.apple.mpegurl")
        || ct.contains("application/x-mpegurl")
        || path_has_extension(url, ".m3u8")
}

/// Whether the upstream asset is a bare MPEG transport-stream segment.
pub fn is_segment(content_type: &str, url: &str) -> bool {
    content_type.to_ascii_lowercase().contains("video/mp2t") || path_has_extension(url, ".ts")
}

fn path_has_extension(url: &str, ext: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        // Not an absolute URL; check the string with any query stripped
        Err(_) => url
            .split_once('?')
            .map(|(p, _)| p)
            .unwrap_or(url)
            .to_ascii_lowercase(),
    };
    path.ends_with(ext)
}

/// Rewrite every URI reference in `body` to a proxied URL.
///
/// Two passes, matching playlist structure: `URI="..."` attributes inside
/// tag lines (encryption keys, media renditions, init sections), then bare
/// segment lines. Unresolvable references are left untouched rather than
/// breaking the whole playlist.
pub fn rewrite_playlist(body: &str, base: &Url, prefix: &str) -> String {
    let mut out_lines = Vec::new();

    for line in body.lines() {
        let line = rewrite_uri_attributes(line, base, prefix);
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            out_lines.push(line);
        } else {
            out_lines.push(proxied_url(prefix, &resolve(base, trimmed)));
        }
    }

    out_lines.join("\n")
}

fn rewrite_uri_attributes(line: &str, base: &Url, prefix: &str) -> String {
    const MARKER: &str = "URI=\"";

    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(pos) = rest.find(MARKER) {
        let value_start = pos + MARKER.len();
        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        match rest.find('"') {
            Some(end) => {
                out.push_str(&proxied_url(prefix, &resolve(base, &rest[..end])));
                rest = &rest[end..];
            }
            None => break, // unterminated attribute; emit as-is
        }
    }

    out.push_str(rest);
    out
}

fn resolve(base: &Url, reference: &str) -> String {
    match base.join(reference) {
        Ok(abs) => abs.to_string(),
        Err(_) => reference.to_string(),
    }
}

/// Build the relay URL wrapping an absolute upstream URL.
fn proxied_url(prefix: &str, absolute: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", absolute)
        .finish();
    format!("{}/stream?{}", prefix, query)
}

/// Wrap a bare transport-stream segment in a minimal playlist: fixed target
/// duration, one entry, explicit end marker.
pub fn synthesize_segment_playlist(segment_url: &str, prefix: &str) -> String {
    [
        "#EXTM3U",
        "#EXT-X-VERSION:3",
        "#EXT-X-TARGETDURATION:30",
        "#EXT-X-MEDIA-SEQUENCE:0",
        "#EXTINF:30.0,",
        &proxied_url(prefix, segment_url),
        "#EXT-X-ENDLIST",
    ]
    .join("\n")
}
