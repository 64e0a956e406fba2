// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Short-lived LRU cache for blockchain explorer reads.
//!
//! Explorer responses change slowly relative to request rate, so reads are
//! cached for a small TTL to keep repeated lookups off the third-party API
//! (which is rate limited).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// In-process TTL'd LRU cache keyed by request signature.
pub struct ChainCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ChainCache {
    /// - `capacity`: max number of cached responses.
    /// - `ttl`: time-to-live for each entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    /// Get a cached response. Returns `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            // Expired — remove it
            cache.pop(key);
        }
        None
    }

    /// Store a response.
    pub fn put(&self, key: &str, value: Value) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                key.to_string(),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}
