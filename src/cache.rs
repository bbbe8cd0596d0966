//! Bounded LRU cache of query bytes to membership results.
//!
//! Only indexed mode consults the cache. The index is immutable after
//! startup, so cached values can never go stale; the cache is built disabled
//! in reread mode and when `cache_capacity` is 0.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

pub struct LookupCache {
    inner: Option<Mutex<LruCache<Box<[u8]>, bool>>>,
}

impl LookupCache {
    /// Creates a cache holding at most `capacity` entries; 0 disables it.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Looks up a normalized query, promoting it to most-recently-used.
    #[inline]
    pub fn get(&self, query: &[u8]) -> Option<bool> {
        let cache = self.inner.as_ref()?;
        cache.lock().get(query).copied()
    }

    /// Stores a result, evicting the least-recently-used entry at capacity.
    #[inline]
    pub fn put(&self, query: &[u8], found: bool) {
        if let Some(cache) = &self.inner {
            cache.lock().put(Box::from(query), found);
        }
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        match &self.inner {
            Some(cache) => cache.lock().len(),
            None => 0,
        }
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
