//! Optimistic client-side cache.
//!
//! This module provides a resource-agnostic in-memory cache that:
//! - Keys detail entries by `(kind, id)` and list entries by `(kind, query)`
//! - Tracks staleness from explicit invalidation and a stale time
//! - Applies optimistic patches that are later settled, committed or rolled back
//! - Orders confirmed writes by request issuance, so a slow early response
//!   never replaces a faster later one
//! - Keeps pending patches on top of confirmed reads; only a mutation's own
//!   confirmation retires the patches made before its request was issued

mod key;
mod store;
mod types;

pub use key::{CacheKey, KeyPrefix, KeyScope};
pub use store::CacheStore;
pub use types::{CacheEvent, CacheStats, CachedValue, Ticket, UndoToken};
