//! Thread-Safe Storage Engine with Expiry Support
//!
//! The store keeps two mappings per key: the value itself and, for keys
//! written with a TTL, an expiration record (`created_at` + `ttl`).
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: keys are spread over 64 shards, each behind its own
//!    `RwLock`, so unrelated keys never contend.
//! 2. **One lock per shard for both mappings**: a value and its expiration
//!    record change together, so a reader sees either the old or the new
//!    state of a key, never a value paired with someone else's TTL.
//! 3. **Lazy Expiry**: a key is checked when read. Expired keys found that way
//!    are removed; the background sweeper handles keys nobody reads.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ values  │ │ values  │ │ values  │ │ values  │           │
//! │  │ expires │ │ expires │ │ expires │ │ expires │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// When a key was written and how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    pub created_at: Instant,
    pub ttl: Duration,
}

impl Expiration {
    /// A record anchored at the current instant.
    pub fn starting_now(ttl: Duration) -> Self {
        Self {
            created_at: Instant::now(),
            ttl,
        }
    }

    /// A key is expired once strictly more than `ttl` has elapsed; exactly at
    /// the boundary it is still live.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct ShardData {
    values: HashMap<Bytes, Bytes>,
    expirations: HashMap<Bytes, Expiration>,
}

impl ShardData {
    fn is_expired_at(&self, key: &[u8], now: Instant) -> bool {
        self.expirations
            .get(key)
            .is_some_and(|exp| exp.is_expired_at(now))
    }

    /// Removes both the value and its expiration record.
    fn remove(&mut self, key: &[u8]) -> bool {
        self.expirations.remove(key);
        self.values.remove(key).is_some()
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardData>,
}

impl Shard {
    // Every mutation is a single HashMap call, so the maps stay consistent
    // even if a holder panicked.
    fn read(&self) -> RwLockReadGuard<'_, ShardData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub expired: u64,
}

/// The key space shared by every connection.
///
/// Wrap it in an `Arc` and hand a clone to each connection task; all
/// operations take `&self`.
///
/// # Example
///
/// ```
/// use kvlite::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.get_expiration(b"session").is_some());
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    fn record_expired(&self, removed: u64) {
        self.key_count.fetch_sub(removed, Ordering::Relaxed);
        self.expired_count.fetch_add(removed, Ordering::Relaxed);
    }

    /// Sets a key without expiry, overwriting any previous value.
    ///
    /// A TTL left over from an earlier `set_with_ttl` is cleared: the value is
    /// replaced wholesale, so it must not inherit the old deadline.
    ///
    /// Returns `true` if the key was newly created.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.shard(&key).write();
        data.expirations.remove(&key);
        let is_new = data.values.insert(key, value).is_none();

        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    /// Sets a key that expires `ttl` after now.
    ///
    /// Returns `true` if the key was newly created.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.shard(&key).write();
        data.expirations
            .insert(key.clone(), Expiration::starting_now(ttl));
        let is_new = data.values.insert(key, value).is_none();

        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    /// Gets the value for a key, or `None` if it is absent or expired.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    /// Like [`get`](Self::get), evaluating expiry at `now`.
    pub fn get_at(&self, key: &[u8], now: Instant) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.shard(key);

        // Fast path under the read lock
        {
            let data = shard.read();
            let value = data.values.get(key)?;
            if !data.is_expired_at(key, now) {
                return Some(value.clone());
            }
        }

        // Expired: take the write lock to drop it
        let mut data = shard.write();
        if data.is_expired_at(key, now) {
            if data.remove(key) {
                self.record_expired(1);
            }
            return None;
        }
        // Rewritten between the two locks
        data.values.get(key).cloned()
    }

    /// The expiration record for a key, if it has one.
    pub fn get_expiration(&self, key: &[u8]) -> Option<Expiration> {
        self.shard(key).read().expirations.get(key).copied()
    }

    /// Attaches an expiration record to an existing key.
    ///
    /// Returns `false` without recording anything if the key has no value.
    pub fn set_expiration(&self, key: &[u8], expiration: Expiration) -> bool {
        let mut data = self.shard(key).write();
        let stored = match data.values.get_key_value(key) {
            Some((stored, _)) => stored.clone(),
            None => return false,
        };
        data.expirations.insert(stored, expiration);
        true
    }

    /// Checks if a key exists and is not expired.
    pub fn exists(&self, key: &[u8]) -> bool {
        let data = self.shard(key).read();
        data.values.contains_key(key) && !data.is_expired_at(key, Instant::now())
    }

    /// Number of stored keys, including expired ones not yet reclaimed.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Removes every expired key. Returns how many were removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let mut total = 0;

        for shard in &self.shards {
            // Skip shards with nothing to do without blocking writers
            if !shard
                .read()
                .expirations
                .values()
                .any(|exp| exp.is_expired_at(now))
            {
                continue;
            }

            let mut data = shard.write();
            let expired: Vec<Bytes> = data
                .expirations
                .iter()
                .filter(|(_, exp)| exp.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();

            for key in expired {
                if data.remove(&key) {
                    total += 1;
                }
            }
        }

        if total > 0 {
            self.record_expired(total);
        }
        total
    }
}
