//! Range header parsing and byte-window resolution
//!
//! Pure functions, no I/O. Malformed client ranges degrade to "no range"
//! (full-body transfer) instead of erroring, which keeps badly behaved
//! players working.

use crate::error::{RelayError, Result};
use crate::models::{RangeSpec, ResolvedWindow};

/// Bytes served for an open-ended range when the upstream total size could
/// not be determined. Bounds the synthetic window instead of streaming an
/// asset of unknown length.
pub const DEFAULT_WINDOW_BYTES: u64 = 256 * 1024;

/// Parse a client `Range` header of the form `bytes=<start>-<end>?`.
///
/// Returns `None` for anything that is not a single well-formed byte range:
/// missing `bytes=` prefix, non-numeric positions, suffix ranges, multiple
/// ranges, or `end < start`. Callers treat `None` as "no range requested".
pub fn parse_range_header(header: &str) -> Option<RangeSpec> {
    let header = header.trim();
    let range_part = header.strip_prefix("bytes=")?;

    let (start_str, end_str) = range_part.split_once('-')?;
    // A second '-' means a multi-range or garbage; degrade to full body
    if end_str.contains('-') || end_str.contains(',') {
        return None;
    }

    let start = start_str.trim().parse::<u64>().ok()?;

    let end = match end_str.trim() {
        "" => None,
        s => {
            let end = s.parse::<u64>().ok()?;
            if end < start {
                return None;
            }
            Some(end)
        }
    };

    Some(RangeSpec { start, end })
}

/// Parse an upstream `Content-Range` header (`bytes start-end/total`).
///
/// Returns `(start, end, total)`; `total` is `None` when the upstream
/// reported `*`.
pub fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let value = value.trim();
    let range_part = value.strip_prefix("bytes ")?;

    let (span, total_str) = range_part.split_once('/')?;
    let (start_str, end_str) = span.split_once('-')?;

    let start = start_str.trim().parse::<u64>().ok()?;
    let end = end_str.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }

    let total = match total_str.trim() {
        "*" => None,
        s => Some(s.parse::<u64>().ok()?),
    };

    Some((start, end, total))
}

/// Extract only the total-size tail of a `Content-Range` header, as produced
/// by a `bytes=0-0` probe (`bytes 0-0/<total>`). More lenient than
/// [`parse_content_range`]: any trailing `/<digits>` is accepted.
pub fn content_range_total(value: &str) -> Option<u64> {
    let (_, tail) = value.trim().rsplit_once('/')?;
    tail.trim().parse::<u64>().ok()
}

/// Resolve a client range against whatever is known about the upstream size.
///
/// - A known total clamps `end` to `total - 1`.
/// - An open-ended range with unknown total gets `default_window` bytes.
/// - A zero-length resource yields the canonical empty window
///   (`bytes 0-0/0`, zero bytes emitted).
/// - A start at or past a known non-zero total is unsatisfiable.
pub fn resolve_window(
    spec: &RangeSpec,
    total: Option<u64>,
    default_window: u64,
) -> Result<ResolvedWindow> {
    if total == Some(0) {
        return Ok(ResolvedWindow {
            start: 0,
            end: 0,
            total: Some(0),
        });
    }

    if let Some(total) = total {
        if spec.start >= total {
            return Err(RelayError::UnsatisfiableRange { total });
        }
    }

    let mut end = match (spec.end, total) {
        (Some(end), _) => end,
        (None, Some(total)) => total - 1,
        (None, None) => spec.start + default_window - 1,
    };

    if let Some(total) = total {
        end = end.min(total - 1);
    }

    Ok(ResolvedWindow {
        start: spec.start,
        end,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_closed_range() {
        let spec = parse_range_header("bytes=0-1023").unwrap();
        assert_eq!(spec.start, 0);
        assert_eq!(spec.end, Some(1023));
    }

    #[test]
    fn test_parse_open_range() {
        let spec = parse_range_header("bytes=100-").unwrap();
        assert_eq!(spec.start, 100);
        assert_eq!(spec.end, None);
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let spec = parse_range_header("  bytes=5-9 ").unwrap();
        assert_eq!(spec.start, 5);
        assert_eq!(spec.end, Some(9));
    }

    #[test]
    fn test_malformed_ranges_degrade_to_none() {
        assert!(parse_range_header("").is_none());
        assert!(parse_range_header("bytes=").is_none());
        assert!(parse_range_header("bytes=-500").is_none());
        assert!(parse_range_header("bytes=abc-def").is_none());
        assert!(parse_range_header("bytes=100-50").is_none());
        assert!(parse_range_header("bytes=0-10,20-30").is_none());
        assert!(parse_range_header("items=0-10").is_none());
        assert!(parse_range_header("0-10").is_none());
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-1023/10240"),
            Some((0, 1023, Some(10240)))
        );
        assert_eq!(parse_content_range("bytes 5-9/*"), Some((5, 9, None)));
        assert!(parse_content_range("bytes 9-5/100").is_none());
        assert!(parse_content_range("0-1023/10240").is_none());
        assert!(parse_content_range("bytes x-y/z").is_none());
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("bytes 0-0/52428800"), Some(52428800));
        assert_eq!(content_range_total("bytes 0-0/*"), None);
        assert_eq!(content_range_total("no slash"), None);
    }

    #[test]
    fn test_resolve_with_known_total() {
        let spec = RangeSpec {
            start: 100,
            end: Some(199),
        };
        let window = resolve_window(&spec, Some(1000), DEFAULT_WINDOW_BYTES).unwrap();
        assert_eq!(window.start, 100);
        assert_eq!(window.end, 199);
        assert_eq!(window.total, Some(1000));
    }

    #[test]
    fn test_resolve_clamps_end_to_total() {
        let spec = RangeSpec {
            start: 900,
            end: Some(5000),
        };
        let window = resolve_window(&spec, Some(1000), DEFAULT_WINDOW_BYTES).unwrap();
        assert_eq!(window.end, 999);
    }

    #[test]
    fn test_resolve_open_range_known_total() {
        let spec = RangeSpec {
            start: 250,
            end: None,
        };
        let window = resolve_window(&spec, Some(1000), DEFAULT_WINDOW_BYTES).unwrap();
        assert_eq!(window.end, 999);
        assert_eq!(window.len(), 750);
    }

    #[test]
    fn test_resolve_open_range_unknown_total_bounded() {
        let spec = RangeSpec {
            start: 100,
            end: None,
        };
        let window = resolve_window(&spec, None, DEFAULT_WINDOW_BYTES).unwrap();
        assert_eq!(window.start, 100);
        assert_eq!(window.end, 100 + DEFAULT_WINDOW_BYTES - 1);
        assert_eq!(window.total, None);
    }

    #[test]
    fn test_resolve_zero_length_resource() {
        let spec = RangeSpec {
            start: 0,
            end: None,
        };
        let window = resolve_window(&spec, Some(0), DEFAULT_WINDOW_BYTES).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.content_range(), "bytes 0-0/0");
    }

    #[test]
    fn test_resolve_start_past_total_unsatisfiable() {
        let spec = RangeSpec {
            start: 1000,
            end: None,
        };
        let err = resolve_window(&spec, Some(1000), DEFAULT_WINDOW_BYTES).unwrap_err();
        assert_eq!(err.to_http_status(), 416);
    }
}
