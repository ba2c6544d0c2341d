//! LRU cache in front of a locator.

use quick_cache::sync::Cache;

use super::{GeoLocator, LocationDescriptor};

/// Default cache capacity (number of addresses).
pub const DEFAULT_LOCATION_CACHE_CAPACITY: usize = 10_000;

/// CachedLocator memoizes lookups of an inner locator.
///
/// Misses are cached as well, so repeated unknown addresses stay cheap.
pub struct CachedLocator<L> {
    inner: L,
    cache: Cache<String, LocationDescriptor>,
}

impl<L: GeoLocator> CachedLocator<L> {
    /// Wrap `inner` with the default capacity.
    pub fn new(inner: L) -> Self {
        Self::with_capacity(inner, DEFAULT_LOCATION_CACHE_CAPACITY)
    }

    /// Wrap `inner` with a custom capacity.
    pub fn with_capacity(inner: L, capacity: usize) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity.max(1)),
        }
    }

    /// Access the wrapped locator (e.g. to hot-reload it).
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Number of cached addresses.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry; call after reloading the inner database.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<L: GeoLocator> GeoLocator for CachedLocator<L> {
    fn resolve(&self, ip: &str) -> LocationDescriptor {
        let key = ip.trim();
        if let Some(hit) = self.cache.get(key) {
            return hit;
        }
        let location = self.inner.resolve(key);
        self.cache.insert(key.to_string(), location.clone());
        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLocator {
        calls: AtomicUsize,
    }

    impl GeoLocator for CountingLocator {
        fn resolve(&self, ip: &str) -> LocationDescriptor {
            self.calls.fetch_add(1, Ordering::SeqCst);
            LocationDescriptor {
                address: format!("resolved:{}", ip),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_repeat_lookups_hit_cache() {
        let cached = CachedLocator::new(CountingLocator {
            calls: AtomicUsize::new(0),
        });

        for _ in 0..10 {
            assert_eq!(cached.resolve("1.1.1.1").address, "resolved:1.1.1.1");
        }
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn test_clear_forces_relookup() {
        let cached = CachedLocator::with_capacity(
            CountingLocator {
                calls: AtomicUsize::new(0),
            },
            4,
        );
        cached.resolve("1.1.1.1");
        cached.clear();
        assert!(cached.is_empty());
        cached.resolve("1.1.1.1");
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
    }
}
