//! Bounded memoization for pattern compilation.
//!
//! Patterns come from a small, closed set of route definitions, so the cache
//! never evicts individual entries. Once it grows past its limit (e.g. because
//! request paths are being tokenized) it is cleared wholesale.

use dashmap::DashMap;
use std::sync::Arc;

/// A concurrent string-keyed cache that resets itself beyond a size bound.
#[derive(Debug)]
pub struct BoundedCache<V> {
    entries: DashMap<String, Arc<V>>,
    limit: usize,
}

impl<V> BoundedCache<V> {
    /// Create a cache holding at most `limit` entries between resets.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// Failed computations are not cached; the next call retries.
    pub fn get_or_try_insert<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.entries.get(key) {
            return Ok(Arc::clone(hit.value()));
        }

        let value = Arc::new(compute()?);
        if self.entries.len() >= self.limit {
            tracing::debug!(limit = self.limit, "Pattern cache limit reached, resetting");
            self.entries.clear();
        }
        self.entries.insert(key.to_string(), Arc::clone(&value));
        Ok(value)
    }

    /// Infallible variant of [`get_or_try_insert`](Self::get_or_try_insert).
    pub fn get_or_insert(&self, key: &str, compute: impl FnOnce() -> V) -> Arc<V> {
        match self.get_or_try_insert::<std::convert::Infallible>(key, || Ok(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
