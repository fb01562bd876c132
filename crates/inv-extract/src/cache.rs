// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vendor layout cache.
//!
//! Keyed by the document's layout hash. The first document of a layout
//! caches the non-name vendor fields it extracted; later documents with
//! the same layout may substitute cached values when extraction finds
//! nothing better. Process-scoped, bounded by an LRU ceiling.

use inv_model::FieldValue;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default LRU ceiling for cached layouts.
pub const DEFAULT_LAYOUT_CACHE_CAPACITY: usize = 256;

/// Non-name vendor fields remembered for a layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedVendorZones {
    /// Postal address.
    pub address: Option<FieldValue<String>>,
    /// Tax identifier.
    pub tax_id: Option<FieldValue<String>>,
    /// Phone number.
    pub phone: Option<FieldValue<String>>,
    /// Email address.
    pub email: Option<FieldValue<String>>,
}

/// LRU cache of vendor zones, guarded by a short critical section.
#[derive(Debug)]
pub struct LayoutCache {
    inner: Mutex<LruCache<String, CachedVendorZones>>,
}

impl LayoutCache {
    /// Create a cache holding at most `capacity` layouts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up the zones for a layout, refreshing its recency.
    #[must_use]
    pub fn get(&self, layout_hash: &str) -> Option<CachedVendorZones> {
        let mut guard = self.inner.lock().expect("layout cache lock poisoned");
        guard.get(layout_hash).cloned()
    }

    /// Record zones for a layout seen for the first time.
    ///
    /// An existing entry is left untouched: the first extraction of a
    /// layout defines its zones.
    pub fn insert_if_absent(&self, layout_hash: &str, zones: CachedVendorZones) {
        let mut guard = self.inner.lock().expect("layout cache lock poisoned");
        if !guard.contains(layout_hash) {
            guard.put(layout_hash.to_string(), zones);
        }
    }

    /// Number of cached layouts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("layout cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(DEFAULT_LAYOUT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(addr: &str) -> CachedVendorZones {
        CachedVendorZones {
            address: Some(FieldValue::unconfirmed(addr.to_string(), 0.4).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn first_insert_wins() {
        let cache = LayoutCache::new(4);
        cache.insert_if_absent("h1", zones("1 Main St"));
        cache.insert_if_absent("h1", zones("2 Other St"));
        let got = cache.get("h1").unwrap();
        assert_eq!(got.address.unwrap().value.unwrap(), "1 Main St");
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = LayoutCache::new(2);
        cache.insert_if_absent("a", zones("a"));
        cache.insert_if_absent("b", zones("b"));
        // Touch "a" so "b" is the eviction candidate.
        let _ = cache.get("a");
        cache.insert_if_absent("c", zones("c"));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn miss_returns_none() {
        let cache = LayoutCache::default();
        assert!(cache.get("nope").is_none());
        assert!(cache.is_empty());
    }
}
