//! Slot lock manager
//!
//! Serializes booking decisions per (shop, date, time). The lock is an
//! in-process keyed mutex: one `tokio::sync::Mutex` per key, created on
//! first use and dropped from the table when the last holder or waiter
//! lets go. Acquisition is bounded by a timeout and release happens in
//! `Drop`, so every exit path (including a panic in the critical section)
//! frees the slot.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::DomainResult;
use crate::shared::errors::DomainError;

/// Deterministic lock key for a bookable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub shop_id: Uuid,
    pub date: NaiveDate,
    /// `None` for the key covering the shop's whole day
    pub time: Option<NaiveTime>,
    id: i64,
}

impl SlotKey {
    pub fn new(shop_id: Uuid, date: NaiveDate, time: NaiveTime) -> Self {
        let canonical = format!(
            "{}|{}|{}",
            shop_id,
            date.format("%Y-%m-%d"),
            time.format("%H:%M")
        );
        Self {
            shop_id,
            date,
            time: Some(time),
            id: derive_id(&canonical),
        }
    }

    /// Key serializing every booking of exclusive services at a shop on
    /// `date`. Overlap checks span slots, so they need a wider lock than
    /// the start slot.
    pub fn whole_day(shop_id: Uuid, date: NaiveDate) -> Self {
        let canonical = format!("{}|{}|*", shop_id, date.format("%Y-%m-%d"));
        Self {
            shop_id,
            date,
            time: None,
            id: derive_id(&canonical),
        }
    }

    /// Stable 64-bit lock id (usable as a Postgres advisory lock key).
    pub fn lock_id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(time) => write!(f, "{}@{} {}", self.shop_id, self.date, time.format("%H:%M")),
            None => write!(f, "{}@{} (day)", self.shop_id, self.date),
        }
    }
}

// First 8 bytes of SHA-256, big-endian. A collision only over-serializes.
fn derive_id(canonical: &str) -> i64 {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(first)
}

/// Table of lazily created mutexes, one per key.
pub struct KeyedMutex<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait up to `timeout` for exclusive access to `key`. Returns `None`
    /// on timeout.
    pub async fn lock(&self, key: K, timeout: Duration) -> Option<KeyedGuard<K>> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Some(KeyedGuard {
                key,
                guard: Some(guard),
                locks: self.locks.clone(),
            }),
            Err(_) => {
                Self::release_entry(&self.locks, &key);
                None
            }
        }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    // Drop the table entry once nobody but the table references it. The
    // DashMap shard lock makes this atomic with respect to `entry()`.
    fn release_entry(locks: &DashMap<K, Arc<Mutex<()>>>, key: &K) {
        locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Held lock; released on drop.
pub struct KeyedGuard<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Drop for KeyedGuard<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Release the mutex first so its Arc count reflects only the table
        // and any waiters.
        self.guard.take();
        KeyedMutex::release_entry(&self.locks, &self.key);
    }
}

/// Serializes booking attempts per slot.
pub struct SlotLockManager {
    locks: KeyedMutex<i64>,
    timeout: Duration,
}

impl SlotLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: KeyedMutex::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `critical` while holding the lock for `key`.
    ///
    /// Fails with `LockTimeout` if the lock is not acquired within the
    /// configured bound; the request can be retried as-is. Calling this
    /// again for the same key from inside `critical` times out rather than
    /// deadlocking.
    pub async fn with_slot_lock<T, F, Fut>(&self, key: SlotKey, critical: F) -> DomainResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let started = Instant::now();
        let guard = self.locks.lock(key.lock_id(), self.timeout).await;
        let waited = started.elapsed();
        metrics::histogram!("booking_slot_lock_wait_seconds").record(waited.as_secs_f64());

        let Some(_guard) = guard else {
            warn!(slot = %key, lock_id = key.lock_id(), waited_ms = waited.as_millis() as u64, "Slot lock timed out");
            metrics::counter!("booking_slot_lock_timeouts_total").increment(1);
            return Err(DomainError::LockTimeout {
                key: key.lock_id(),
                waited_ms: waited.as_millis() as u64,
            });
        };

        debug!(slot = %key, lock_id = key.lock_id(), "Slot lock acquired");
        let result = critical().await;
        debug!(slot = %key, ok = result.is_ok(), "Slot lock released");
        result
    }

    /// Slots currently locked or contended.
    pub fn active_slots(&self) -> usize {
        self.locks.len()
    }
}
