//! Bounded least-recently-used connection cache.
//!
//! Maps a cache key (see [`TargetDescriptor::cache_key`]) to a value owning
//! live transport resources. Removing a value from the cache drops it, and
//! dropping a connection releases its socket or reaps its child process, so
//! eviction, replacement and invalidation all release resources the same way.
//!
//! [`TargetDescriptor::cache_key`]: crate::TargetDescriptor::cache_key

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Counters describing cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Fixed-capacity map with least-recently-used eviction.
///
/// Recency order is kept in a deque, front = least recently used. Lookups
/// are linear in the number of entries, which stays small (tens of
/// connections).
#[derive(Debug)]
pub struct ConnectionCache<T> {
    capacity: usize,
    entries: HashMap<String, T>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T> ConnectionCache<T> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up an entry and mark it as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&mut T> {
        if self.entries.contains_key(key) {
            self.hits += 1;
            self.touch(key);
            self.entries.get_mut(key)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Look up an entry without touching its recency or the counters.
    pub fn peek(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    /// Insert an entry as most recently used.
    ///
    /// An existing entry under the same key is replaced and dropped. If the
    /// cache is full, the least recently used entry is evicted and dropped;
    /// its key is returned.
    pub fn put(&mut self, key: impl Into<String>, value: T) -> Option<String> {
        let key = key.into();
        if self.entries.insert(key.clone(), value).is_some() {
            debug!("Replaced cached connection {}", key);
            self.touch(&key);
            return None;
        }
        self.order.push_back(key);
        self.evict_until(self.capacity)
    }

    /// Return the entry for `key`, inserting one built by `make` if absent.
    ///
    /// Lookup and insertion happen under one `&mut self` borrow, so callers
    /// holding the cache behind a lock get an atomic get-or-create.
    pub fn get_or_insert_with(&mut self, key: &str, make: impl FnOnce() -> T) -> &mut T {
        if self.entries.contains_key(key) {
            self.hits += 1;
            self.touch(key);
        } else {
            self.misses += 1;
            self.evict_until(self.capacity - 1);
            self.order.push_back(key.to_string());
        }
        self.entries.entry(key.to_string()).or_insert_with(make)
    }

    /// Remove an entry, releasing its resources. Returns whether it existed.
    pub fn invalidate(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(value) => {
                self.order.retain(|k| k != key);
                drop(value);
                debug!("Invalidated cached connection {}", key);
                true
            }
            None => false,
        }
    }

    /// Remove every entry. Returns how many were removed.
    pub fn invalidate_all(&mut self) -> usize {
        let count = self.entries.len();
        // Release in LRU order so the oldest connections go first.
        while let Some(key) = self.order.pop_front() {
            self.entries.remove(&key);
        }
        self.entries.clear();
        if count > 0 {
            debug!("Invalidated {} cached connections", count);
        }
        count
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_until(&mut self, limit: usize) -> Option<String> {
        let mut evicted = None;
        while self.entries.len() > limit {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                self.evictions += 1;
                debug!("Evicted least recently used connection {}", oldest);
                evicted = Some(oldest);
            }
        }
        evicted
    }
}
