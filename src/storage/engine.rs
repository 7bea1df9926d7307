//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! Keys and values are untyped byte strings. Each key may carry an absolute
//! deadline after which it is logically deleted.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐    │
//! │  │  Shard 0  │ │  Shard 1  │ │  Shard 2  │ │  Shard N  │    │
//! │  │  Mutex    │ │  Mutex    │ │  Mutex    │ │  Mutex    │    │
//! │  │ data  ttl │ │ data  ttl │ │ data  ttl │ │ data  ttl │    │
//! │  └───────────┘ └───────────┘ └───────────┘ └───────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A shard's value table and expiry table sit behind the same lock, so no
//! reader ever sees a key present in one and missing from the other. Every
//! operation purges expired keys from the shards it locks before doing its
//! work. With one shard this degenerates to a single global lock.
//!
//! Operations spanning several shards take the locks in ascending shard
//! order, which keeps them deadlock-free against each other.

use crate::storage::pattern::glob_match;
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Values and deadlines for the keys hashed to one shard.
#[derive(Debug, Default)]
pub(crate) struct Shard {
    pub(crate) data: HashMap<Bytes, Bytes>,
    /// Invariant: every key here is also in `data`.
    pub(crate) expiry: HashMap<Bytes, Instant>,
}

impl Shard {
    /// Evicts every key whose deadline is at or before `now`, along with any
    /// deadline left behind by a missing value. Returns the number of values
    /// evicted.
    fn purge_expired(&mut self, now: Instant) -> u64 {
        if self.expiry.is_empty() {
            return 0;
        }

        let data = &mut self.data;
        let mut evicted = 0;
        self.expiry.retain(|key, deadline| {
            if now >= *deadline {
                if data.remove(key).is_some() {
                    evicted += 1;
                }
                false
            } else {
                data.contains_key(key)
            }
        });
        evicted
    }

    fn take(&mut self, key: &[u8]) -> Option<(Bytes, Option<Instant>)> {
        let value = self.data.remove(key)?;
        Some((value, self.expiry.remove(key)))
    }

    /// Stores `value` under `key` with exactly the given deadline, replacing
    /// whatever deadline `key` had before.
    fn put(&mut self, key: Bytes, value: Bytes, deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => {
                self.expiry.insert(key.clone(), deadline);
            }
            None => {
                self.expiry.remove(&key);
            }
        }
        self.data.insert(key, value);
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.expiry.clear();
    }
}

/// Operation counters, readable without locking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    /// Keys evicted because their deadline passed
    pub expired: u64,
}

/// The shared key/value store.
///
/// Wrap it in an `Arc` and hand clones to the dispatcher and to background
/// tasks. All methods take `&self`.
///
/// # Example
///
/// ```
/// use snapkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("ruby"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("ruby")));
///
/// assert!(engine.expire(b"name", Duration::from_secs(60)));
/// assert!(engine.rename(b"name", Bytes::from("user")));
/// assert_eq!(engine.key_type(b"name"), "none");
/// assert_eq!(engine.key_type(b"user"), "string");
/// ```
pub struct StorageEngine {
    shards: Box<[Mutex<Shard>]>,
    /// Held for the whole of a snapshot dump or load so they never overlap.
    pub(crate) snapshot_lock: Mutex<()>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty engine with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates an engine with `count` independently locked shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| Mutex::new(Shard::default())).collect();

        Self {
            shards,
            snapshot_lock: Mutex::new(()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Number of shards. `1` means every operation takes the same lock.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub(crate) fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Locks shard `index` and purges it.
    fn lock_shard(&self, index: usize) -> MutexGuard<'_, Shard> {
        let mut shard = self.shards[index].lock();
        self.purge_locked(&mut shard, Instant::now());
        shard
    }

    #[inline]
    fn lock_key(&self, key: &[u8]) -> MutexGuard<'_, Shard> {
        self.lock_shard(self.shard_index(key))
    }

    /// Locks and purges every shard, in index order.
    pub(crate) fn lock_all(&self) -> Vec<MutexGuard<'_, Shard>> {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                let mut shard = shard.lock();
                self.purge_locked(&mut shard, now);
                shard
            })
            .collect()
    }

    fn purge_locked(&self, shard: &mut Shard, now: Instant) -> u64 {
        let evicted = shard.purge_expired(now);
        if evicted > 0 {
            self.expired_count.fetch_add(evicted, Ordering::Relaxed);
        }
        evicted
    }

    /// Inserts or overwrites `key`.
    ///
    /// A deadline already armed on a live key is kept. Returns `true` if the
    /// key was newly created.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.lock_key(&key).data.insert(key, value).is_none()
    }

    /// Returns the value of a live key.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.lock_key(key).data.get(key).cloned()
    }

    /// Returns true if `key` is live. Expired keys in its shard are purged
    /// first, so an expired key never counts as existing.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.lock_key(key).data.contains_key(key)
    }

    /// `"string"` for a live key, `"none"` otherwise.
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        if self.exists(key) {
            "string"
        } else {
            "none"
        }
    }

    /// Removes a key and its deadline. Returns `true` if the key existed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.lock_key(key).take(key).is_some()
    }

    /// Arms (or re-arms) a deadline `ttl` from now on an existing key.
    ///
    /// Returns `false` without touching anything if the key does not exist.
    /// A zero `ttl` makes the key expire on the next access. A `ttl` too far
    /// out to represent leaves the key without a deadline.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let mut shard = self.lock_key(key);
        let Some((stored, _)) = shard.data.get_key_value(key) else {
            return false;
        };
        let stored = stored.clone();
        match Instant::now().checked_add(ttl) {
            Some(deadline) => {
                shard.expiry.insert(stored, deadline);
            }
            None => {
                shard.expiry.remove(&stored);
            }
        }
        true
    }

    /// Remaining time before `key` expires, if it exists and has a deadline.
    pub fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let shard = self.lock_key(key);
        shard
            .expiry
            .get(key)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Moves the value stored at `old` to `new`.
    ///
    /// The deadline of `old`, if any, moves with it. If `old` had none, any
    /// deadline left on `new` from a previous occupant is dropped. Returns
    /// `false` if `old` does not exist.
    pub fn rename(&self, old: &[u8], new: Bytes) -> bool {
        let (from, to) = (self.shard_index(old), self.shard_index(&new));

        if from == to {
            let mut shard = self.lock_shard(from);
            if old == &new[..] {
                return shard.data.contains_key(old);
            }
            return match shard.take(old) {
                Some((value, deadline)) => {
                    shard.put(new, value, deadline);
                    true
                }
                None => false,
            };
        }

        let (mut source, mut target) = if from < to {
            let source = self.lock_shard(from);
            (source, self.lock_shard(to))
        } else {
            let target = self.lock_shard(to);
            (self.lock_shard(from), target)
        };

        match source.take(old) {
            Some((value, deadline)) => {
                target.put(new, value, deadline);
                true
            }
            None => false,
        }
    }

    /// Every live key, in no particular order.
    pub fn keys(&self) -> Vec<Bytes> {
        self.collect_keys(|_| true)
    }

    /// Live keys matching a glob pattern (see [`glob_match`]).
    pub fn keys_matching(&self, pattern: &[u8]) -> Vec<Bytes> {
        self.collect_keys(|key| glob_match(pattern, key))
    }

    fn collect_keys(&self, mut keep: impl FnMut(&[u8]) -> bool) -> Vec<Bytes> {
        let mut keys = Vec::new();
        for index in 0..self.shards.len() {
            let shard = self.lock_shard(index);
            keys.extend(shard.data.keys().filter(|k| keep(k)).cloned());
        }
        keys
    }

    /// Removes every key and deadline.
    pub fn clear(&self) {
        let mut shards = self.lock_all();
        for shard in shards.iter_mut() {
            shard.clear();
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        (0..self.shards.len())
            .map(|index| self.lock_shard(index).data.len())
            .sum()
    }

    /// Returns true if no live key remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps every shard for expired keys. Returns how many were evicted.
    pub fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| self.purge_locked(&mut shard.lock(), now))
            .sum()
    }

    /// Snapshot of the operation counters.
    ///
    /// # Returns
    ///
    /// A [`StorageStats`] copy; later operations do not update it.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
