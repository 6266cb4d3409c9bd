//! Shared in-memory cache with optimistic writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;

use super::key::{CacheKey, KeyPrefix};
use super::types::{CacheEvent, CacheStats, CachedValue, Ticket, UndoToken};

type Patch = Arc<dyn Fn(&mut Value) + Send + Sync>;

struct PendingPatch {
  id: u64,
  apply: Patch,
}

struct Entry {
  /// Last confirmed value
  base: Value,
  /// `base` with every pending patch applied, in issue order
  visible: Value,
  fetched_at: DateTime<Utc>,
  stale: bool,
  confirmed: u64,
  pending: Vec<PendingPatch>,
}

impl Entry {
  fn recompute(&mut self) {
    let mut visible = self.base.clone();
    for patch in &self.pending {
      (patch.apply)(&mut visible);
    }
    self.visible = visible;
  }
}

#[derive(Default)]
struct State {
  entries: HashMap<CacheKey, Entry>,
  /// Sequence of the last evicted write per key; older confirmed writes stay out
  tombstones: HashMap<CacheKey, u64>,
  seq: u64,
  /// Tickets at or below this were issued before the last `clear_all`
  fence: u64,
  hits: u64,
  misses: u64,
}

impl State {
  fn next_seq(&mut self) -> u64 {
    self.seq += 1;
    self.seq
  }
}

struct Inner {
  state: Mutex<State>,
  events: broadcast::Sender<CacheEvent>,
  stale_time: Duration,
}

/// Process-wide cache shared by every resource hook.
///
/// Cloning is cheap and every clone sees the same entries. Values are stored
/// as opaque JSON; nothing here looks past the key.
#[derive(Clone)]
pub struct CacheStore {
  inner: Arc<Inner>,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(256);
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(State::default()),
        events,
        stale_time: Duration::minutes(5),
      }),
    }
  }

  /// Stale times too large to represent are treated as never stale.
  pub fn from_config(config: &CacheConfig) -> Self {
    let stale_time = i64::try_from(config.stale_time_secs)
      .ok()
      .and_then(Duration::try_seconds)
      .unwrap_or_else(|| {
        warn!(
          secs = config.stale_time_secs,
          "cache.stale_time_secs out of range, entries never go stale"
        );
        Duration::MAX
      });
    Self::new().with_stale_time(stale_time)
  }

  /// Set how long confirmed values count as fresh. Only meaningful before
  /// the store is shared.
  pub fn with_stale_time(self, stale_time: Duration) -> Self {
    let state = std::mem::take(&mut *self.state());
    let events = self.inner.events.clone();
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(state),
        events,
        stale_time,
      }),
    }
  }

  /// How long confirmed values count as fresh.
  pub fn stale_time(&self) -> std::time::Duration {
    self.inner.stale_time.to_std().unwrap_or_default()
  }

  fn state(&self) -> MutexGuard<'_, State> {
    // Cache state stays consistent between statements, so a panic elsewhere
    // never leaves it half-written.
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn is_stale(&self, entry: &Entry) -> bool {
    entry.stale || Utc::now() - entry.fetched_at > self.inner.stale_time
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine
    let _ = self.inner.events.send(event);
  }

  /// Take a ticket at the moment a request is issued.
  pub fn issue(&self) -> Ticket {
    Ticket(self.state().next_seq())
  }

  /// Read an entry with its staleness flag.
  pub fn read(&self, key: &CacheKey) -> Option<CachedValue> {
    let mut state = self.state();
    let cached = state.entries.get(key).map(|entry| CachedValue {
      value: entry.visible.clone(),
      stale: self.is_stale(entry),
      fetched_at: entry.fetched_at,
      pending: entry.pending.len(),
    });

    match &cached {
      Some(c) if !c.stale => {
        state.hits += 1;
        trace!(%key, "cache hit");
      }
      Some(_) => {
        state.misses += 1;
        debug!(%key, "cache entry stale");
      }
      None => {
        state.misses += 1;
        trace!(%key, "cache miss");
      }
    }
    cached
  }

  /// Replace an entry with a confirmed value.
  pub fn write(&self, key: CacheKey, value: Value) {
    let ticket = self.issue();
    self.write_confirmed(key, value, ticket);
  }

  /// Replace an entry with a confirmed value from the request issued at
  /// `ticket`. Returns false, leaving the entry alone, when a later request
  /// already confirmed a value, when the key was evicted after the ticket was
  /// issued, or when the cache was cleared since.
  ///
  /// Pending optimistic patches stay on top of the new value: a read that
  /// lands mid-mutation does not hide the mutation.
  pub fn write_confirmed(&self, key: CacheKey, value: Value, ticket: Ticket) -> bool {
    self.write_at(key, value, ticket, false)
  }

  /// `write_confirmed` for the result of a mutation. Patches made before
  /// its request was issued are retired too: their own responses can no
  /// longer be written.
  pub fn write_mutation(&self, key: CacheKey, value: Value, ticket: Ticket) -> bool {
    self.write_at(key, value, ticket, true)
  }

  fn write_at(&self, key: CacheKey, value: Value, ticket: Ticket, retire_older: bool) -> bool {
    let mut state = self.state();

    if ticket.0 <= state.fence {
      debug!(%key, "dropping write issued before cache clear");
      return false;
    }
    if state.tombstones.get(&key).is_some_and(|seq| ticket.0 <= *seq) {
      debug!(%key, "dropping write issued before eviction");
      return false;
    }
    state.tombstones.remove(&key);

    let now = Utc::now();
    match state.entries.get_mut(&key) {
      Some(entry) => {
        if ticket.0 < entry.confirmed {
          debug!(%key, "dropping write superseded by a later request");
          return false;
        }
        entry.base = value;
        entry.fetched_at = now;
        entry.stale = false;
        entry.confirmed = ticket.0;
        if retire_older {
          entry.pending.retain(|p| p.id > ticket.0);
        }
        entry.recompute();
      }
      None => {
        state.entries.insert(
          key,
          Entry {
            visible: value.clone(),
            base: value,
            fetched_at: now,
            stale: false,
            confirmed: ticket.0,
            pending: Vec::new(),
          },
        );
      }
    }
    true
  }

  /// Apply a local patch before the server confirms it.
  ///
  /// Returns `None` when there is nothing cached under `key` to patch.
  pub fn optimistic_write<F>(&self, key: &CacheKey, patch: F) -> Option<UndoToken>
  where
    F: Fn(&mut Value) + Send + Sync + 'static,
  {
    let mut state = self.state();
    let id = state.next_seq();
    let entry = state.entries.get_mut(key)?;

    let snapshot = entry.visible.clone();
    let before = entry.pending.iter().map(|p| p.id).collect();
    patch(&mut entry.visible);
    entry.pending.push(PendingPatch {
      id,
      apply: Arc::new(patch),
    });

    debug!(%key, pending = entry.pending.len(), "optimistic write");
    Some(UndoToken {
      key: key.clone(),
      id,
      snapshot,
      before,
      confirmed: entry.confirmed,
    })
  }

  /// Undo an optimistic write after its request failed.
  ///
  /// Returns true when the entry is back to its pre-patch state. If a
  /// confirmed write landed after the snapshot was taken, the confirmed value
  /// wins and only the patch itself is dropped.
  pub fn rollback(&self, token: UndoToken) -> bool {
    let mut state = self.state();
    let Some(entry) = state.entries.get_mut(&token.key) else {
      return false;
    };
    let Some(position) = entry.pending.iter().position(|p| p.id == token.id) else {
      return false;
    };

    // The snapshot is exact only while nothing changed underneath it
    let untouched = position + 1 == entry.pending.len()
      && entry.confirmed == token.confirmed
      && entry.pending[..position]
        .iter()
        .map(|p| p.id)
        .eq(token.before.iter().copied());
    entry.pending.remove(position);

    if untouched {
      entry.visible = token.snapshot;
      debug!(key = %token.key, "rolled back to snapshot");
      true
    } else {
      entry.recompute();
      debug!(key = %token.key, "rolled back onto newer state");
      entry.confirmed == token.confirmed
    }
  }

  /// Keep an optimistic write as confirmed state after the server accepted
  /// the change without sending the entity back. Dropped instead if a later
  /// request confirmed a value in the meantime.
  pub fn commit(&self, token: UndoToken) {
    let mut state = self.state();
    let Some(entry) = state.entries.get_mut(&token.key) else {
      return;
    };
    let Some(position) = entry.pending.iter().position(|p| p.id == token.id) else {
      return;
    };

    let patch = entry.pending.remove(position);
    if entry.confirmed == token.confirmed {
      (patch.apply)(&mut entry.base);
    }
    entry.recompute();
    debug!(key = %token.key, "optimistic write committed");
  }

  /// Retire an optimistic write after its request succeeded.
  pub fn settle(&self, token: UndoToken) {
    let mut state = self.state();
    if let Some(entry) = state.entries.get_mut(&token.key) {
      entry.pending.retain(|p| p.id != token.id);
      entry.recompute();
    }
  }

  /// Mark matching entries stale. Returns how many were marked.
  pub fn invalidate(&self, prefix: &KeyPrefix) -> usize {
    let keys: Vec<CacheKey> = {
      let mut state = self.state();
      state
        .entries
        .iter_mut()
        .filter(|(key, _)| prefix.matches(key))
        .map(|(key, entry)| {
          entry.stale = true;
          key.clone()
        })
        .collect()
    };

    debug!(?prefix, count = keys.len(), "invalidated");
    let count = keys.len();
    for key in keys {
      self.emit(CacheEvent::Invalidated(key));
    }
    count
  }

  /// Remove one entry. Confirmed writes issued before the eviction are
  /// ignored afterwards.
  pub fn evict(&self, key: &CacheKey) -> bool {
    let removed = {
      let mut state = self.state();
      let seq = state.next_seq();
      state.tombstones.insert(key.clone(), seq);
      state.entries.remove(key).is_some()
    };
    if removed {
      self.emit(CacheEvent::Evicted(key.clone()));
    }
    removed
  }

  /// Drop everything (tenant switch, logout). Requests in flight at this
  /// point can no longer write.
  pub fn clear_all(&self) {
    {
      let mut state = self.state();
      state.fence = state.next_seq();
      state.entries.clear();
      state.tombstones.clear();
    }
    debug!("cache cleared");
    self.emit(CacheEvent::Cleared);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  pub fn stats(&self) -> CacheStats {
    let state = self.state();
    CacheStats {
      hits: state.hits,
      misses: state.misses,
      entries: state.entries.len(),
    }
  }

  pub fn len(&self) -> usize {
    self.state().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
