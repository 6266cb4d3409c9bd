//! Async query and mutation handles, one per consumer of a resource read or write.
//!
//! Modelled on TanStack Query's `useQuery`, a `Query<T>` owns the loading /
//! success / error state of one read, runs the fetch on a spawned task and
//! hands the result back through a channel. A handle that is unmounted or
//! dropped cancels its fetch: the result is neither cached nor delivered.
//!
//! # Example
//!
//! ```ignore
//! let mut query = Query::list(session.users(), ListParams::new(1, 20));
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, re-render
//! }
//!
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(page) => render_rows(&page.data),
//!     QueryState::Error(e) => render_error(&e.message),
//!     QueryState::Idle => {}
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::api::{ApiError, ListParams, Page};
use crate::cache::{CacheEvent, CacheKey, CacheStore, KeyPrefix};
use crate::resource::{Liveness, Resource, ResourceHooks};

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

/// Creates the future for one fetch; the liveness flag belongs to that fetch.
type FetcherFn<T> = Box<dyn Fn(Liveness) -> BoxFuture<T> + Send + Sync>;

/// Cache invalidations this query reacts to.
struct Watch {
  events: broadcast::Receiver<CacheEvent>,
  prefix: KeyPrefix,
}

pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, ApiError>>>,
  live: Liveness,
  mounted: bool,
  watch: Option<Watch>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher.
  ///
  /// The fetcher is called on every `fetch()` / `refetch()` and receives the
  /// liveness flag of that fetch, to pass on to the hook it calls.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn(Liveness) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move |live| Box::pin(fetcher(live))),
      receiver: None,
      live: Liveness::new(),
      mounted: true,
      watch: None,
      fetched_at: None,
      stale_time: Duration::from_secs(60),
    }
  }

  /// Set the stale time for this query.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  /// Refetch whenever a cache entry matching `prefix` is invalidated or the
  /// cache is cleared.
  pub fn watching(mut self, cache: &CacheStore, prefix: KeyPrefix) -> Self {
    self.watch = Some(Watch {
      events: cache.subscribe(),
      prefix,
    });
    self
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.state.error()
  }

  pub fn is_mounted(&self) -> bool {
    self.mounted
  }

  /// Check if the data is stale (older than stale_time).
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if !self.mounted || self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Force a refetch, abandoning any fetch in flight.
  pub fn refetch(&mut self) {
    if !self.mounted {
      return;
    }
    self.start_fetch();
  }

  /// Detach the consumer. A fetch still in flight finishes quietly without
  /// touching the cache, and the state is never updated again.
  pub fn unmount(&mut self) {
    self.mounted = false;
    self.live.cancel();
    self.receiver = None;
    self.watch = None;
  }

  /// Poll for results from a pending fetch and for invalidations.
  ///
  /// Returns `true` if the state changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    if !self.mounted {
      return false;
    }

    let mut changed = self.poll_result();

    let settled = matches!(self.state, QueryState::Success(_) | QueryState::Error(_));
    if self.take_invalidation() && settled {
      debug!("cache invalidated, refetching");
      self.start_fetch();
      changed = true;
    }
    changed
  }

  fn poll_result(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Task ended without sending (panicked or aborted)
        self.state = QueryState::Error(ApiError::network("Query was cancelled"));
        self.receiver = None;
        true
      }
    }
  }

  /// Drain pending cache events; true if any concerned this query.
  fn take_invalidation(&mut self) -> bool {
    let Some(watch) = &mut self.watch else {
      return false;
    };

    let mut hit = false;
    loop {
      match watch.events.try_recv() {
        Ok(CacheEvent::Invalidated(key)) => hit |= watch.prefix.matches(&key),
        Ok(CacheEvent::Cleared) => hit = true,
        Ok(CacheEvent::Evicted(_)) => {}
        // Missed events might have been ours
        Err(broadcast::error::TryRecvError::Lagged(_)) => hit = true,
        Err(_) => break,
      }
    }
    hit
  }

  fn start_fetch(&mut self) {
    // Whatever was in flight no longer matters
    self.live.cancel();
    self.live = Liveness::new();

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)(self.live.clone());
    tokio::spawn(async move {
      let result = future.await;
      // Receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<R: Resource> Query<Page<R>> {
  /// Query one page of a resource list, refetching when lists of that kind
  /// are invalidated.
  pub fn list(hooks: ResourceHooks<R>, params: ListParams) -> Self {
    let cache = hooks.cache().clone();
    Query::new(move |live| {
      let hooks = hooks.clone();
      let params = params.clone();
      async move { hooks.list_while(&params, &live).await }
    })
    .watching(&cache, KeyPrefix::lists(R::KIND))
    .with_stale_time(cache.stale_time())
  }
}

impl<R: Resource> Query<Option<R>> {
  /// Query one entity by id, refetching when it is invalidated.
  pub fn detail(hooks: ResourceHooks<R>, id: impl Into<String>) -> Self {
    let id = id.into();
    let cache = hooks.cache().clone();
    let key = CacheKey::detail(R::KIND, &id);
    Query::new(move |live| {
      let hooks = hooks.clone();
      let id = id.clone();
      async move { hooks.get_while(&id, &live).await }
    })
    .watching(&cache, KeyPrefix::Exact(key))
    .with_stale_time(cache.stale_time())
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    self.live.cancel();
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("mounted", &self.mounted)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}

/// The state of a mutation
#[derive(Debug, Clone)]
pub enum MutationState<T> {
  Idle,
  /// A write is in flight
  Pending,
  Success(T),
  Error(ApiError),
}

/// Tracks one write for a consumer, the way [`Query`] tracks a read.
///
/// The write runs on a spawned task and its result comes back through
/// [`poll`](Self::poll). Starting another write while one is pending drops
/// the earlier result; the earlier request itself still completes.
pub struct Mutation<T> {
  state: MutationState<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, ApiError>>>,
}

impl<T: Send + 'static> Mutation<T> {
  pub fn new() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }

  /// Run `write` in the background, e.g. `async move { hooks.update(&id, &patch).await }`.
  pub fn mutate<Fut>(&mut self, write: Fut)
  where
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;

    tokio::spawn(async move {
      let result = write.await;
      let _ = tx.send(result);
    });
  }

  /// Pick up the result of the write in flight. Returns `true` if the state
  /// changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };

    let next = match receiver.try_recv() {
      Ok(Ok(data)) => MutationState::Success(data),
      Ok(Err(error)) => MutationState::Error(error),
      Err(mpsc::error::TryRecvError::Empty) => return false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        MutationState::Error(ApiError::network("Mutation was cancelled"))
      }
    };
    self.state = next;
    self.receiver = None;
    true
  }

  /// Back to idle, forgetting the last result and any write in flight.
  pub fn reset(&mut self) {
    self.state = MutationState::Idle;
    self.receiver = None;
  }

  pub fn state(&self) -> &MutationState<T> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  pub fn is_success(&self) -> bool {
    matches!(self.state, MutationState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self.state, MutationState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match &self.state {
      MutationState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match &self.state {
      MutationState::Error(e) => Some(e),
      _ => None,
    }
  }
}

impl<T: Send + 'static> Default for Mutation<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Mutation<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Mutation")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
