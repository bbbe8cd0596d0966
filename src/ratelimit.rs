//! Per-IP sliding-window admission of requests.
//!
//! Each client IP (address only, port excluded, IPv6 distinct from IPv4)
//! owns a queue of request timestamps inside the last 60 seconds. A request
//! is rejected when the pruned queue already holds `requests_per_minute`
//! entries; rejected requests are not recorded. Clients behind NAT share a
//! bucket.
//!
//! One coarse mutex over the bucket map is enough at the target scale;
//! timestamps within a bucket are monotonic because insertion order is time
//! order. Stale buckets are swept opportunistically every
//! [`SWEEP_EVERY`] checks.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    collections::VecDeque,
    net::IpAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

const WINDOW: Duration = Duration::from_secs(60);
const SWEEP_EVERY: u64 = 1024;

pub struct RateLimiter {
    buckets: Mutex<FxHashMap<IpAddr, VecDeque<Instant>>>,
    limit: Option<usize>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            buckets: Mutex::new(FxHashMap::default()),
            limit: Some(requests_per_minute as usize),
            checks: AtomicU64::new(0),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self {
            buckets: Mutex::new(FxHashMap::default()),
            limit: None,
            checks: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.limit.is_some()
    }

    /// Admits or rejects one request from `ip`, recording it if admitted.
    #[inline]
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let Some(limit) = self.limit else {
            return true;
        };

        let mut buckets = self.buckets.lock();

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == 0 {
            buckets.retain(|_, bucket| {
                bucket
                    .back()
                    .copied()
                    .is_some_and(|t| now.duration_since(t) < WINDOW)
            });
        }

        let bucket = buckets.entry(ip).or_default();
        while bucket
            .front()
            .copied()
            .is_some_and(|t| now.duration_since(t) >= WINDOW)
        {
            bucket.pop_front();
        }

        if bucket.len() >= limit {
            return false;
        }

        bucket.push_back(now);
        true
    }

    /// Number of live buckets, for diagnostics.
    #[allow(dead_code)]
    pub fn tracked_ips(&self) -> usize {
        self.buckets.lock().len()
    }
}
