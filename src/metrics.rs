//! Server counters.
//!
//! Plain atomics owned by the server instance; no export endpoint. An
//! external metrics surface only ever consumes [`Metrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub(crate) accepted_connections: AtomicU64,
    pub(crate) dropped_connections: AtomicU64,
    pub(crate) tls_handshake_failures: AtomicU64,
    pub(crate) queries: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
    pub(crate) rate_limited: AtomicU64,
    pub(crate) request_errors: AtomicU64,
}

impl Metrics {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted_connections: self.accepted_connections.load(Ordering::Relaxed),
            dropped_connections: self.dropped_connections.load(Ordering::Relaxed),
            tls_handshake_failures: self.tls_handshake_failures.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Connections returned by `accept`, including ones later dropped.
    pub accepted_connections: u64,
    /// Connections closed immediately because all workers were busy.
    pub dropped_connections: u64,
    pub tls_handshake_failures: u64,
    /// Requests that completed the read phase and reached dispatch.
    pub queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rate_limited: u64,
    pub request_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = Metrics::default();

        Metrics::incr(&metrics.queries);
        Metrics::incr(&metrics.queries);
        Metrics::incr(&metrics.cache_hits);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.dropped_connections, 0);
    }
}
