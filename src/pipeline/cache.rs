//! Bounded FIFO cache of sanitized content, keyed by content hash.
//!
//! Eviction is strictly by insertion order: reads never refresh an entry,
//! and overwriting a present key keeps its original position.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A cached sanitization result
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Sanitized value
    pub sanitized_value: Value,
    /// Time of first insertion or last overwrite
    pub inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry stamped now
    pub fn new(sanitized_value: Value) -> Self {
        Self {
            sanitized_value,
            inserted_at: Utc::now(),
        }
    }
}

/// Ring buffer of slots plus a key index.
#[derive(Debug)]
pub struct FifoCache {
    slots: Vec<(String, CacheEntry)>,
    index: HashMap<String, usize>,
    /// Slot that the next new key will take once the ring is full
    next: usize,
    capacity: usize,
}

impl FifoCache {
    /// Create a cache holding at most `capacity` entries. Zero disables it.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(1024)),
            index: HashMap::new(),
            next: 0,
            capacity,
        }
    }

    /// Insert or overwrite. Returns the key evicted to make room, if any.
    pub fn insert(&mut self, key: String, entry: CacheEntry) -> Option<String> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&slot) = self.index.get(&key) {
            self.slots[slot].1 = entry;
            return None;
        }

        if self.slots.len() < self.capacity {
            self.index.insert(key.clone(), self.slots.len());
            self.slots.push((key, entry));
            self.next = self.slots.len() % self.capacity;
            return None;
        }

        let slot = self.next;
        let (evicted, _) = std::mem::replace(&mut self.slots[slot], (key.clone(), entry));
        self.index.remove(&evicted);
        self.index.insert(key, slot);
        self.next = (slot + 1) % self.capacity;
        Some(evicted)
    }

    /// Look up without affecting eviction order
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.index.get(key).map(|&slot| &self.slots[slot].1)
    }

    /// True if `key` is cached
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from oldest to newest
    pub fn keys(&self) -> Vec<&str> {
        let len = self.slots.len();
        let start = if len < self.capacity { 0 } else { self.next };
        (0..len)
            .map(|i| self.slots[(start + i) % len].0.as_str())
            .collect()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.next = 0;
    }
}
