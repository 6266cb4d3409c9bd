//! Typed, cached access to the opsdesk REST API.
//!
//! - [`api`]: HTTP transport, response envelopes and typed errors
//! - [`cache`]: shared optimistic cache with issuance-ordered writes
//! - [`resource`]: per-resource CRUD hooks and entity types
//! - [`query`]: polled query handles for interactive consumers
//! - [`notifications`]: server-sent notification stream and inbox
//! - [`session`]: tenant-scoped wiring of all of the above

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;
pub mod notifications;
pub mod query;
pub mod resource;
pub mod session;

pub use api::{ApiError, ErrorKind};
pub use session::Session;
