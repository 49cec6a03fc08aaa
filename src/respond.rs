//! Response synthesis
//!
//! Assembles the client-facing status line, headers, and body stream for
//! each negotiation path: full-body passthrough, forwarded 206 from a
//! range-cooperative upstream, and synthesized 206 sliced out of a
//! range-naive upstream. Headers are fully built before the body stream is
//! handed to the connection, so they always reach the wire ahead of the
//! first body byte.

use crate::error::RelayError;
use crate::fetch::FetchedUpstream;
use crate::models::{RangeSpec, ResolvedWindow};
use crate::slicer::WindowStream;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http::header::{HeaderMap, HeaderValue};
use http::{Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tracing::debug;

/// Unified body type for all relay responses: buffered JSON/text payloads
/// and live upstream streams alike.
pub type RelayBody = UnsyncBoxBody<Bytes, RelayError>;

pub fn full_body(data: impl Into<Bytes>) -> RelayBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty_body() -> RelayBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// Box an upstream byte stream into a response body, mapping transport
/// errors into the relay error type. An error mid-stream aborts the
/// connection; no JSON payload is attempted once headers are gone.
fn stream_body<S>(stream: S) -> RelayBody
where
    S: futures_util::Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let frames = stream
        .map_err(|e| RelayError::Stream(e.to_string()))
        .map(|result| result.map(Frame::data));
    BodyExt::boxed_unsync(StreamBody::new(frames))
}

/// Headers common to every stream response: range advertisement, inline
/// playback, permissive CORS, and short-lived shared caching.
pub fn apply_stream_headers(headers: &mut HeaderMap, content_type: &str) {
    headers.insert(
        "content-type",
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("video/mp4")),
    );
    headers.insert("accept-ranges", HeaderValue::from_static("bytes"));
    headers.insert("content-disposition", HeaderValue::from_static("inline"));
    headers.insert(
        "cache-control",
        HeaderValue::from_static("public, max-age=3600"),
    );
    apply_cors_headers(headers);
}

pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Range, Authorization, Content-Type"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("Content-Range, Content-Length, Accept-Ranges"),
    );
}

/// Wire one upstream transfer into exactly one client response, per the
/// negotiation table:
///
/// | Client range | Upstream cooperative | Status | Content-Range          |
/// |--------------|----------------------|--------|------------------------|
/// | no           | n/a                  | 200    | absent                 |
/// | yes          | yes                  | 206    | forwarded verbatim     |
/// | yes          | no                   | 206    | synthesized from window|
///
/// `window` must be supplied on the range-naive path and is ignored
/// otherwise.
pub fn synthesize(
    upstream: FetchedUpstream,
    client_range: Option<&RangeSpec>,
    window: Option<&ResolvedWindow>,
) -> crate::error::Result<Response<RelayBody>> {
    let info = upstream.info;

    let mut builder = Response::builder();

    match client_range {
        None => {
            // Full-body passthrough
            builder = builder.status(StatusCode::OK);
            if let Some(length) = info.content_length {
                builder = builder.header("content-length", length);
            }
            debug!("Synthesizing 200 passthrough response");
            finish(builder, &info.content_type, stream_body(upstream.body))
        }
        Some(_) if info.is_range_cooperative() => {
            // Upstream already emitted exactly the requested window
            builder = builder.status(StatusCode::PARTIAL_CONTENT);
            if let Some(content_range) = &info.content_range {
                builder = builder.header("content-range", content_range.clone());
            }
            if let Some(length) = info.content_length {
                builder = builder.header("content-length", length);
            }
            debug!("Synthesizing 206 cooperative passthrough response");
            finish(builder, &info.content_type, stream_body(upstream.body))
        }
        Some(_) => {
            let window = window.ok_or_else(|| {
                RelayError::InternalError(
                    "range-naive response requires a resolved window".to_string(),
                )
            })?;

            builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header("content-range", window.content_range())
                .header("content-length", window.len());

            debug!(
                "Synthesizing 206 sliced response: {} ({} bytes)",
                window.content_range(),
                window.len()
            );

            let body = if window.is_empty() {
                empty_body()
            } else {
                stream_body(WindowStream::new(upstream.body, window))
            };
            finish(builder, &info.content_type, body)
        }
    }
}

fn finish(
    builder: http::response::Builder,
    content_type: &str,
    body: RelayBody,
) -> crate::error::Result<Response<RelayBody>> {
    let mut response = builder
        .body(body)
        .map_err(|e| RelayError::InternalError(format!("Failed to build response: {}", e)))?;
    apply_stream_headers(response.headers_mut(), content_type);
    Ok(response)
}

/// Build the JSON error response for a failure that happened before any
/// body bytes were written.
pub fn error_response(err: &RelayError) -> Response<RelayBody> {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let payload = serde_json::json!({ "error": err.to_string() });

    let mut response = Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(payload.to_string()))
        .expect("static error response must build");

    if let RelayError::UnsatisfiableRange { total } = err {
        if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
            response.headers_mut().insert("content-range", value);
        }
    }

    apply_cors_headers(response.headers_mut());
    response
}

/// Build the 200 response carrying a rewritten or synthesized playlist.
pub fn playlist_response(playlist: String) -> Response<RelayBody> {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", crate::manifest::PLAYLIST_CONTENT_TYPE)
        .header("content-disposition", "inline")
        .body(full_body(playlist))
        .expect("playlist response must build");
    apply_cors_headers(response.headers_mut());
    response
}

/// Plain JSON response helper for the operational endpoints.
pub fn json_response(status: StatusCode, value: serde_json::Value) -> Response<RelayBody> {
    let mut response = Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(value.to_string()))
        .expect("static json response must build");
    apply_cors_headers(response.headers_mut());
    response
}
