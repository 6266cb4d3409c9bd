//! Per-login wiring of transport, cache and resource hooks.

use std::sync::Arc;

use tracing::info;

use crate::api::RestTransport;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::notifications::{NotificationFeed, NotificationInbox};
use crate::resource::{
  Approval, Resource, ResourceHooks, RetryPolicy, Task, ThemeClient, User, Workflow,
};

/// Everything one signed-in user needs to talk to the API.
///
/// All hooks handed out share the session's cache, so a mutation through one
/// hook is visible to reads through any other.
#[derive(Clone)]
pub struct Session {
  transport: Arc<dyn RestTransport>,
  cache: CacheStore,
  retry: RetryPolicy,
  buffer_size: usize,
  tenant: Option<String>,
}

impl Session {
  pub fn new(transport: Arc<dyn RestTransport>, cache: CacheStore) -> Self {
    Self {
      transport,
      cache,
      retry: RetryPolicy::default(),
      buffer_size: NotificationInbox::default().capacity(),
      tenant: None,
    }
  }

  /// Build a session with cache, retry and inbox settings from config, scoped
  /// to the configured tenant if there is one.
  pub fn from_config(transport: Arc<dyn RestTransport>, config: &Config) -> Self {
    let mut session = Self {
      transport,
      cache: CacheStore::from_config(&config.cache),
      retry: RetryPolicy::from_config(&config.retry),
      buffer_size: config.notifications.buffer_size,
      tenant: None,
    };
    if let Some(tenant) = &config.tenant {
      session.transport.set_tenant(Some(tenant));
      session.tenant = Some(tenant.clone());
    }
    session
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn tenant(&self) -> Option<&str> {
    self.tenant.as_deref()
  }

  pub fn hooks<R: Resource>(&self) -> ResourceHooks<R> {
    ResourceHooks::new(self.transport.clone(), self.cache.clone()).with_retry(self.retry)
  }

  pub fn users(&self) -> ResourceHooks<User> {
    self.hooks()
  }

  pub fn tasks(&self) -> ResourceHooks<Task> {
    self.hooks()
  }

  pub fn workflows(&self) -> ResourceHooks<Workflow> {
    self.hooks()
  }

  pub fn approvals(&self) -> ResourceHooks<Approval> {
    self.hooks()
  }

  pub fn theme(&self) -> ThemeClient {
    ThemeClient::new(self.transport.clone(), self.cache.clone()).with_retry(self.retry)
  }

  pub fn notifications(&self) -> NotificationFeed {
    NotificationFeed::new(self.transport.clone())
  }

  /// An empty inbox sized from config.
  pub fn inbox(&self) -> NotificationInbox {
    NotificationInbox::new(self.buffer_size)
  }

  /// Scope all further requests to `tenant`. Nothing cached for the previous
  /// tenant survives, including responses still in flight.
  pub fn switch_tenant(&mut self, tenant: &str) {
    if self.tenant.as_deref() == Some(tenant) {
      return;
    }
    info!(from = ?self.tenant, to = tenant, "switching tenant");
    self.transport.set_tenant(Some(tenant));
    self.tenant = Some(tenant.to_string());
    self.cache.clear_all();
  }

  /// Drop all cached data and the tenant scope.
  pub fn logout(&mut self) {
    info!("logging out");
    self.transport.set_tenant(None);
    self.tenant = None;
    self.cache.clear_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockTransport;
  use crate::api::{ListParams, Method};
  use serde_json::json;

  fn users_body(email: &str) -> serde_json::Value {
    json!({
      "data": [{
        "id": "u1",
        "tenant_id": "t1",
        "email": email,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
      }]
    })
  }

  #[test]
  fn test_from_config_applies_tenant() {
    let config = Config::parse(
      "api:\n  base_url: https://erp.example.com\ntenant: acme\nnotifications:\n  buffer_size: 5\n",
    )
    .unwrap();
    let mock = MockTransport::new();
    let session = Session::from_config(mock.clone(), &config);

    assert_eq!(session.tenant(), Some("acme"));
    assert_eq!(mock.tenant().as_deref(), Some("acme"));
    assert_eq!(session.inbox().capacity(), 5);
  }

  #[tokio::test]
  async fn test_hooks_share_cache() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users", users_body("a@x.com"));
    let session = Session::new(mock.clone(), CacheStore::new());

    session.users().list(&ListParams::default()).await.unwrap();
    session.users().list(&ListParams::default()).await.unwrap();
    assert_eq!(mock.count(Method::Get, "/users"), 1);
    assert_eq!(session.cache().stats().hits, 1);
  }

  #[tokio::test]
  async fn test_switch_tenant_clears_cache_and_fences_in_flight() {
    let mock = MockTransport::new();
    let gate = mock.gate(Method::Get, "/users");
    mock.reply(Method::Get, "/users", users_body("b@x.com"));
    let mut session = Session::new(mock.clone(), CacheStore::new());
    session.switch_tenant("t1");

    let users = session.users();
    let in_flight = tokio::spawn(async move { users.list(&ListParams::default()).await });
    mock.received(1).await;

    session.switch_tenant("t2");
    assert_eq!(mock.tenant().as_deref(), Some("t2"));

    gate.ok(users_body("a@x.com"));
    in_flight.await.unwrap().unwrap();
    // The old tenant's answer was not cached
    assert!(session.cache().is_empty());

    let page = session.users().list(&ListParams::default()).await.unwrap();
    assert_eq!(page.data[0].email, "b@x.com");
    assert_eq!(mock.count(Method::Get, "/users"), 2);
  }

  #[tokio::test]
  async fn test_logout_clears_everything() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users", users_body("a@x.com"));
    let mut session = Session::new(mock.clone(), CacheStore::new());
    session.switch_tenant("t1");
    session.users().list(&ListParams::default()).await.unwrap();
    assert!(!session.cache().is_empty());

    session.logout();
    assert!(session.cache().is_empty());
    assert_eq!(session.tenant(), None);
    assert_eq!(mock.tenant(), None);
  }
}
