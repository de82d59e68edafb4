//! Disposal-aware LRU cache.
//!
//! The pipeline keeps two of these, one for decoded rasters and one for raw
//! payload buffers. Capacity is a fixed entry count; inserting past it
//! evicts exactly the least-recently-used entry and hands it to the
//! disposal hook, which releases whatever native resource the payload
//! holds. Without a hook the evicted value is simply dropped.
//!
//! Eviction order is part of the contract: the nth distinct insert
//! displaces precisely the oldest untouched key, and the hook fires exactly
//! once per displaced payload. No awaits happen while the list mutex is
//! held.

use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

type Disposer<V> = Box<dyn Fn(V) + Send + Sync>;

/// Fixed-capacity LRU cache that routes every displaced value through an
/// optional disposal hook.
pub struct DisposalLru<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V>>,
    dispose: Option<Disposer<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V> DisposalLru<K, V> {
    /// Creates a cache holding at most `capacity` entries. A zero capacity
    /// is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Creates a cache whose displaced values are passed to `dispose`
    /// before being dropped.
    pub fn with_disposer(capacity: usize, dispose: impl Fn(V) + Send + Sync + 'static) -> Self {
        Self::build(capacity, Some(Box::new(dispose) as Disposer<V>))
    }

    fn build(capacity: usize, dispose: Option<Disposer<V>>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            dispose,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    ///
    /// Returns an independent duplicate; the cache's own copy is never
    /// handed out mutably.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts `value` under `key` as most-recently-used.
    ///
    /// Displaces the LRU entry when at capacity, or the previous value when
    /// the key already exists; either way the displaced payload goes
    /// through the disposal hook exactly once. Same-key replacement does
    /// not count as an eviction.
    pub fn insert(&self, key: K, value: V) {
        let displaced = {
            let mut entries = self.entries.lock();
            let replacing = entries.contains(&key);
            let displaced = entries.push(key, value);
            if displaced.is_some() && !replacing {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            displaced
        };
        // Hook runs outside the lock; it may be arbitrarily slow.
        if let Some((_, old)) = displaced {
            if let Some(dispose) = &self.dispose {
                dispose(old);
            }
        }
    }

    /// Returns `true` without touching the recency order.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Empties the cache, disposing every payload.
    pub fn clear(&self) {
        let drained: Vec<(K, V)> = {
            let mut entries = self.entries.lock();
            let mut drained = Vec::with_capacity(entries.len());
            while let Some(entry) = entries.pop_lru() {
                drained.push(entry);
            }
            drained
        };
        if let Some(dispose) = &self.dispose {
            for (_, value) in drained {
                dispose(value);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
