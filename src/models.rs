//! Core data models for the streaming relay
//!
//! All of these are request-scoped: created when a stream request starts and
//! dropped at response completion, error, or client disconnect.

use serde::{Deserialize, Serialize};

/// A byte range requested by a client, parsed from a `Range` header.
///
/// `end` is `None` for open-ended requests (`bytes=N-`), meaning "to the end
/// of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive), if the client supplied one
    pub end: Option<u64>,
}

impl RangeSpec {
    /// Convert this spec back to an HTTP Range header value for forwarding
    /// upstream.
    pub fn to_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// The concrete byte window the relay has decided to serve.
///
/// Derived from a [`RangeSpec`] plus whatever total size probing produced.
/// `end` is always inclusive and, when `total` is known, clamped to
/// `total - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: u64,
    pub end: u64,
    /// Total size of the upstream resource, when it could be determined
    pub total: Option<u64>,
}

impl ResolvedWindow {
    /// Number of bytes this window will emit.
    ///
    /// A zero-length resource yields an empty window regardless of the
    /// nominal `start`/`end` values.
    pub fn len(&self) -> u64 {
        if self.total == Some(0) {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the `Content-Range` header value for this window,
    /// `bytes start-end/total` or `bytes start-end/*` when the total is
    /// unknown.
    pub fn content_range(&self) -> String {
        match self.total {
            Some(total) => format!("bytes {}-{}/{}", self.start, self.end, total),
            None => format!("bytes {}-{}/*", self.start, self.end),
        }
    }
}

/// Metadata observed on the upstream response, captured before the body is
/// consumed.
#[derive(Debug, Clone)]
pub struct UpstreamInfo {
    pub status: u16,
    /// Content type after sanitization (`text/*` origins are overridden)
    pub content_type: String,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
}

impl UpstreamInfo {
    /// Whether the upstream honored the forwarded range itself: status 206
    /// with a Content-Range we can actually parse. Anything else is treated
    /// as range-naive and goes through the slicer.
    pub fn is_range_cooperative(&self) -> bool {
        self.status == 206
            && self
                .content_range
                .as_deref()
                .and_then(crate::range::parse_content_range)
                .is_some()
    }
}

/// The authenticated caller, extracted from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
}

/// Outcome of the access gate for one lecture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    /// The upstream asset to stream when allowed: the preview URL (falling
    /// back to the primary URL) for previews, else the primary URL.
    pub target_url: Option<String>,
}

/// Lecture record as supplied by the course catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecture {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Course record as supplied by the course catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub price: u64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl Course {
    /// A course only requires an access grant when it is flagged paid AND
    /// carries a non-zero price.
    pub fn requires_purchase(&self) -> bool {
        self.is_paid && self.price > 0
    }
}

fn default_active() -> bool {
    true
}
