//! Values exchanged with the cache store.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::key::CacheKey;

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
  /// Visible value: last confirmed write with pending optimistic patches applied
  pub value: Value,
  /// Invalidated or older than the stale time; the next read should refetch
  pub stale: bool,
  /// When the confirmed value was written
  pub fetched_at: DateTime<Utc>,
  /// Number of optimistic patches still waiting for their request to settle
  pub pending: usize,
}

/// Issuance order of a request. Later tickets win over earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub(crate) u64);

/// Handle for undoing one optimistic write.
///
/// Consumed exactly once, by [`CacheStore::rollback`](super::CacheStore::rollback)
/// on failure or [`CacheStore::settle`](super::CacheStore::settle) on success.
#[derive(Debug)]
#[must_use = "an optimistic write must be rolled back or settled"]
pub struct UndoToken {
  pub(crate) key: CacheKey,
  pub(crate) id: u64,
  pub(crate) snapshot: Value,
  /// Patches already pending when this one was applied
  pub(crate) before: Vec<u64>,
  /// Confirmed ticket of the entry when the snapshot was taken
  pub(crate) confirmed: u64,
}

impl UndoToken {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// The value visible before the patch was applied.
  pub fn snapshot(&self) -> &Value {
    &self.snapshot
  }
}

/// Broadcast to subscribers when entries change underneath them.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
  Invalidated(CacheKey),
  Evicted(CacheKey),
  Cleared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub entries: usize,
}
