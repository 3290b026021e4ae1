//! Generic expiring key/value map.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// A single cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
  fn new(value: V, ttl: Duration) -> Self {
    Self {
      value,
      expires_at: Instant::now() + ttl,
    }
  }

  /// An entry is live strictly before its expiry instant.
  pub fn is_expired_at(&self, now: Instant) -> bool {
    now >= self.expires_at
  }
}

/// Thread-safe map whose entries expire after a fixed time-to-live.
///
/// Expiry is lazy: `get` treats an expired entry as a miss but leaves it in
/// place. Expired entries are physically removed by [`TtlCache::remove_expired`],
/// which a [`Sweeper`](super::Sweeper) calls periodically.
///
/// Cloning is cheap and yields a handle onto the same map.
pub struct TtlCache<V> {
  entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
  ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
  pub fn new(ttl: Duration) -> Self {
    Self {
      entries: Arc::new(RwLock::new(HashMap::new())),
      ttl,
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// Look up a live value.
  pub fn get(&self, key: &str) -> Option<V> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    let entry = entries.get(key)?;
    if entry.is_expired_at(Instant::now()) {
      return None;
    }
    Some(entry.value.clone())
  }

  /// Store a value under the cache's default TTL, replacing any previous entry.
  pub fn set(&self, key: impl Into<String>, value: V) {
    self.set_with_ttl(key, value, self.ttl);
  }

  pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    entries.insert(key.into(), CacheEntry::new(value, ttl));
  }

  pub fn remove(&self, key: &str) -> Option<V> {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    entries.remove(key).map(|e| e.value)
  }

  pub fn clear(&self) {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    entries.clear();
  }

  /// Drop every entry whose expiry instant has passed. Returns how many were removed.
  pub fn remove_expired(&self) -> usize {
    let now = Instant::now();
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired_at(now));
    before - entries.len()
  }

  /// Number of stored entries, including expired ones not yet swept.
  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V> Clone for TtlCache<V> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
      ttl: self.ttl,
    }
  }
}

impl<V> std::fmt::Debug for TtlCache<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TtlCache")
      .field("ttl", &self.ttl)
      .finish_non_exhaustive()
  }
}
