//! Byte-window slicing for range-naive upstreams
//!
//! When the origin ignores a forwarded Range header and streams the full
//! resource, the relay carves the requested window out of the live stream:
//! discard bytes until the window start, emit until the window is full, then
//! end the output early without waiting for upstream EOF. Memory use is
//! bounded by the chunk size, never the window or asset size.

use crate::models::ResolvedWindow;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Stateful transform that slices a `[start, end]` byte window out of an
/// arbitrary chunk stream.
///
/// The entire state is two counters: bytes skipped from the head of the
/// stream and bytes passed downstream. Output is independent of how the
/// input happens to be framed into chunks.
#[derive(Debug)]
pub struct WindowSlicer {
    /// First byte of the window (offset within the upstream stream)
    start: u64,
    /// Total bytes the window emits
    window_len: u64,
    /// Bytes discarded from the head so far
    skipped: u64,
    /// Bytes emitted downstream so far
    passed: u64,
}

impl WindowSlicer {
    pub fn new(window: &ResolvedWindow) -> Self {
        WindowSlicer {
            start: window.start,
            window_len: window.len(),
            skipped: 0,
            passed: 0,
        }
    }

    /// Feed one upstream chunk through the window.
    ///
    /// Returns the bytes of this chunk that fall inside the window, or
    /// `None` when the chunk lies entirely outside it. Slicing is zero-copy:
    /// emitted chunks are sub-slices of the input.
    pub fn next_chunk(&mut self, chunk: Bytes) -> Option<Bytes> {
        if self.is_done() {
            return None;
        }

        let mut buf = chunk;

        // Skip until the window start
        if self.skipped < self.start {
            let need = self.start - self.skipped;
            if (buf.len() as u64) <= need {
                self.skipped += buf.len() as u64;
                return None;
            }
            buf = buf.slice(need as usize..);
            self.skipped = self.start;
        }

        if buf.is_empty() {
            return None;
        }

        // Truncate at the window end
        let remaining = self.window_len - self.passed;
        if (buf.len() as u64) > remaining {
            let out = buf.slice(..remaining as usize);
            self.passed += remaining;
            Some(out)
        } else {
            self.passed += buf.len() as u64;
            Some(buf)
        }
    }

    /// Whether the full window has been emitted. Once true the caller should
    /// stop feeding chunks and tear down the upstream connection.
    pub fn is_done(&self) -> bool {
        self.passed >= self.window_len
    }

    /// Bytes emitted so far.
    pub fn passed(&self) -> u64 {
        self.passed
    }
}

/// Pull-based stream adapter around [`WindowSlicer`].
///
/// Wraps an upstream chunk stream and yields only the windowed bytes. The
/// stream ends as soon as the window is full - the inner stream is not
/// polled again, so dropping this adapter releases the upstream connection
/// without draining it. Backpressure is inherited: the inner stream is only
/// polled when the consumer polls this one.
pub struct WindowStream<S> {
    inner: S,
    slicer: WindowSlicer,
}

impl<S> WindowStream<S> {
    pub fn new(inner: S, window: &ResolvedWindow) -> Self {
        WindowStream {
            inner,
            slicer: WindowSlicer::new(window),
        }
    }
}

impl<S, E> Stream for WindowStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
{
    type Item = std::result::Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.slicer.is_done() {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if let Some(out) = self.slicer.next_chunk(chunk) {
                        return Poll::Ready(Some(Ok(out)));
                    }
                    // Chunk fell outside the window; pull the next one
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
