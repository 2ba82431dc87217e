// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory TTL/LRU Cache
//!
//! A bounded cache for hot-path memoization: entries expire after their
//! TTL and, when the cache is full, least-recently-used entries make room
//! for new ones.
//!
//! ## Expiry
//!
//! Expiry is enforced **lazily on read** (an expired entry behaves as a
//! miss and is removed on the spot) and **eagerly on bounded background
//! sweeps** ([`MemoryCache::sweep`], or the supervised task from
//! [`MemoryCache::spawn_sweeper`]). Sweeps are bounded per pass so a large
//! cache never stalls its lock for a full scan.
//!
//! ## Eviction
//!
//! Eviction order is least-recently-used; ties in access time are broken
//! by insertion order (older insertion evicts first). The scan is linear
//! in the entry count, which is the right trade for the small caches this
//! serves: no auxiliary list to keep coherent under the lock.
//!
//! ## Events
//!
//! With an emitter bound, the cache reports `cache.hit`, `cache.miss`,
//! `cache.stored`, and `cache.evicted` (capacity evictions and swept
//! expirations alike).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use command_pipeline_domain::events::{event_names, EventEmitter, PipelineEvent};
use command_pipeline_domain::PipelineError;

use crate::infrastructure::runtime::{spawn_periodic, MaintenanceHandle};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_access: Instant,
    inserted_seq: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_seq: u64,
}

/// Bounded TTL/LRU cache.
///
/// Cheap to clone; clones share entries. Values are returned by clone, so
/// `V` is typically an `Arc` or a small result type.
#[derive(Clone)]
pub struct MemoryCache<K, V> {
    capacity: usize,
    state: Arc<Mutex<CacheState<K, V>>>,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache bounded to `capacity` entries.
    ///
    /// # Errors
    ///
    /// Zero capacity fails with `invalidConfiguration`.
    pub fn new(capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::invalid_config("cache capacity must be non-zero"));
        }
        Ok(Self {
            capacity,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
            })),
            emitter: None,
        })
    }

    /// Binds an emitter for `cache.*` events
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event);
        }
    }

    /// Looks up `key`, touching recency on a hit.
    ///
    /// Expired entries behave as misses and are removed on the spot.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        match state.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = now;
                let value = entry.value.clone();
                drop(state);
                self.emit(PipelineEvent::new(event_names::CACHE_HIT).with_property("key", format!("{:?}", key)));
                Some(value)
            }
            Some(_) => {
                state.entries.remove(key);
                drop(state);
                self.emit(PipelineEvent::new(event_names::CACHE_MISS).with_property("key", format!("{:?}", key)));
                None
            }
            None => {
                drop(state);
                self.emit(PipelineEvent::new(event_names::CACHE_MISS).with_property("key", format!("{:?}", key)));
                None
            }
        }
    }

    /// Stores `value` under `key` for `ttl`.
    ///
    /// When the cache is full, least-recently-used entries are evicted
    /// until there is room.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut evicted = Vec::new();
        {
            let mut state = self.state.lock();

            while state.entries.len() >= self.capacity && !state.entries.contains_key(&key) {
                // LRU scan; access-time ties fall back to insertion order.
                let victim = state
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| (e.last_access, e.inserted_seq))
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(victim) => {
                        state.entries.remove(&victim);
                        evicted.push(victim);
                    }
                    None => break,
                }
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                key.clone(),
                CacheEntry {
                    value,
                    expires_at: now + ttl,
                    last_access: now,
                    inserted_seq: seq,
                },
            );
        }

        for victim in evicted {
            self.emit(
                PipelineEvent::new(event_names::CACHE_EVICTED)
                    .with_property("key", format!("{:?}", victim))
                    .with_property("reason", "capacity"),
            );
        }
        self.emit(PipelineEvent::new(event_names::CACHE_STORED).with_property("key", format!("{:?}", key)));
    }

    /// Removes `key`; returns whether an entry was present
    pub fn invalidate(&self, key: &K) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of stored entries (expired-but-unswept included)
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Checks whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Removes up to `max_entries` expired entries; returns how many went.
    ///
    /// One bounded pass; call repeatedly (or run the background sweeper)
    /// to drain a large backlog.
    pub fn sweep(&self, max_entries: usize) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .take(max_entries)
                .map(|(k, _)| k.clone())
                .collect()
        };

        let mut removed = 0;
        for key in expired {
            if self.state.lock().entries.remove(&key).is_some() {
                removed += 1;
                self.emit(
                    PipelineEvent::new(event_names::CACHE_EVICTED)
                        .with_property("key", format!("{:?}", key))
                        .with_property("reason", "expired"),
                );
            }
        }
        removed
    }

    /// Spawns the background sweeper; stop or drop the handle on
    /// shutdown
    pub fn spawn_sweeper(&self, interval: Duration, batch: usize) -> MaintenanceHandle {
        let cache = self.clone();
        spawn_periodic("cache-sweeper", interval, move || cache.sweep(batch))
    }
}

impl<K, V> std::fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("capacity", &self.capacity)
            .field("len", &self.state.lock().entries.len())
            .finish()
    }
}
