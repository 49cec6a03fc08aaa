//! Byte-range streaming relay for course video assets
//!
//! A proxy that fetches a remote video (or HLS asset) on behalf of an
//! authorized client and re-serves it with byte-exact partial-content
//! semantics, even when the origin ignores Range requests. When the origin
//! cooperates (206 + Content-Range) bytes are piped through untouched; when
//! it does not, the requested window is carved out of the live stream
//! without buffering the asset.
//!
//! # Architecture
//!
//! - [`access::AccessGate`]: decides whether the caller may view a lecture
//!   asset, before any upstream connection is opened
//! - [`probe::SizeProber`]: determines the upstream total size via HEAD or a
//!   `bytes=0-0` probe, tolerating origins that refuse both
//! - [`fetch::UpstreamFetcher`]: opens the streaming transfer and classifies
//!   the origin's range cooperation
//! - [`slicer::WindowSlicer`]: carves the requested byte window out of an
//!   uncooperative origin's stream, chunk by chunk
//! - [`respond`]: synthesizes the 200/206 status and header set and wires
//!   the body stream to the client
//! - [`manifest::ManifestRewriter`]: rewrites HLS playlists so every
//!   referenced sub-resource routes back through the relay
//! - [`server::RelayServer`]: hyper front end tying it all together
//!
//! Everything is request-scoped: no state is shared between concurrent
//! streams beyond read-only configuration and the metrics counters.

pub mod access;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod range;
pub mod respond;
pub mod server;
pub mod slicer;

// Re-export commonly used types
pub use access::{AccessGate, CourseCatalog, StaticCatalog};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use fetch::UpstreamFetcher;
pub use manifest::ManifestRewriter;
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use models::{AccessDecision, Course, Lecture, Principal, RangeSpec, ResolvedWindow};
pub use pipeline::StreamPipeline;
pub use probe::SizeProber;
pub use server::RelayServer;
pub use slicer::{WindowSlicer, WindowStream};
