//! Metrics collection for the streaming relay
//!
//! Thread-safe counters using atomic operations, snapshotted for the
//! `/stats` endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the relay
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Request statistics
    total_requests: AtomicU64,
    range_requests: AtomicU64,

    // Outcome statistics
    passthrough_responses: AtomicU64,
    cooperative_responses: AtomicU64,
    sliced_responses: AtomicU64,
    manifest_rewrites: AtomicU64,

    // Failure statistics
    access_denials: AtomicU64,
    upstream_failures: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub range_requests: u64,
    pub passthrough_responses: u64,
    pub cooperative_responses: u64,
    pub sliced_responses: u64,
    pub manifest_rewrites: u64,
    pub access_denials: u64,
    pub upstream_failures: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inbound stream request.
    pub fn record_request(&self, has_range: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if has_range {
            self.range_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a full-body 200 passthrough.
    pub fn record_passthrough(&self) {
        self.passthrough_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a 206 forwarded from a range-cooperative upstream.
    pub fn record_cooperative(&self) {
        self.cooperative_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a 206 synthesized by slicing a range-naive upstream.
    pub fn record_sliced(&self) {
        self.sliced_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served manifest (rewritten or synthesized).
    pub fn record_manifest(&self) {
        self.manifest_rewrites.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an access gate denial.
    pub fn record_denial(&self) {
        self.access_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upstream transport or status failure.
    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            range_requests: self.range_requests.load(Ordering::Relaxed),
            passthrough_responses: self.passthrough_responses.load(Ordering::Relaxed),
            cooperative_responses: self.cooperative_responses.load(Ordering::Relaxed),
            sliced_responses: self.sliced_responses.load(Ordering::Relaxed),
            manifest_rewrites: self.manifest_rewrites.load(Ordering::Relaxed),
            access_denials: self.access_denials.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RelayMetrics::new();

        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_sliced();
        metrics.record_denial();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.range_requests, 1);
        assert_eq!(snap.sliced_responses, 1);
        assert_eq!(snap.access_denials, 1);
        assert_eq!(snap.cooperative_responses, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = RelayMetrics::new();
        metrics.record_request(false);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["total_requests"], 1);
    }
}
