//! Generic CRUD operations over one resource kind, coordinated with the cache.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::envelope::{BulkRequest, Envelope};
use crate::api::{
  ApiError, BulkResult, ErrorKind, ListParams, Page, RequestOptions, RestTransport,
};
use crate::cache::{CacheKey, CacheStore, KeyPrefix, Ticket};

use super::retry::RetryPolicy;
use super::validation::Validate;
use super::Resource;

/// Whether the consumer that started a read still wants its result.
///
/// Reads check this right before touching the cache, so a result that
/// settles after its consumer went away is dropped.
#[derive(Debug, Clone)]
pub struct Liveness {
  alive: Arc<AtomicBool>,
}

impl Liveness {
  pub fn new() -> Self {
    Self {
      alive: Arc::new(AtomicBool::new(true)),
    }
  }

  /// For callers that always want results cached.
  pub fn always() -> Self {
    Self::new()
  }

  pub fn is_alive(&self) -> bool {
    self.alive.load(Ordering::Acquire)
  }

  pub fn cancel(&self) {
    self.alive.store(false, Ordering::Release);
  }
}

impl Default for Liveness {
  fn default() -> Self {
    Self::new()
  }
}

/// List, get, create, update, delete and bulk actions for resource `R`.
///
/// Reads are served from the shared cache while fresh. Mutations never guess
/// at server-side ordering: they invalidate list entries instead of editing
/// them, and only `update` patches a cached entity ahead of the response.
pub struct ResourceHooks<R: Resource> {
  transport: Arc<dyn RestTransport>,
  cache: CacheStore,
  retry: RetryPolicy,
  _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceHooks<R> {
  fn clone(&self) -> Self {
    Self {
      transport: Arc::clone(&self.transport),
      cache: self.cache.clone(),
      retry: self.retry,
      _resource: PhantomData,
    }
  }
}

impl<R: Resource> ResourceHooks<R> {
  pub fn new(transport: Arc<dyn RestTransport>, cache: CacheStore) -> Self {
    Self {
      transport,
      cache,
      retry: RetryPolicy::default(),
      _resource: PhantomData,
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  fn detail_path(id: &str) -> String {
    format!("{}/{}", R::PATH, id)
  }

  fn require_id(id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() {
      return Err(ApiError::validation(
        "ID_REQUIRED",
        format!("{} id is required", R::KIND),
      ));
    }
    Ok(())
  }

  /// Confirmed write of an entity under its detail key.
  fn store(&self, key: CacheKey, entity: &R, ticket: Ticket) {
    match serde_json::to_value(entity) {
      Ok(value) => {
        self.cache.write_confirmed(key, value, ticket);
      }
      Err(e) => warn!(kind = R::KIND, error = %e, "failed to cache entity"),
    }
  }

  /// Like `store`, for the entity an update returned.
  fn store_updated(&self, key: CacheKey, entity: &R, ticket: Ticket) {
    match serde_json::to_value(entity) {
      Ok(value) => {
        self.cache.write_mutation(key, value, ticket);
      }
      Err(e) => warn!(kind = R::KIND, error = %e, "failed to cache updated entity"),
    }
  }

  fn invalidate_lists(&self) {
    self.cache.invalidate(&KeyPrefix::lists(R::KIND));
  }

  /// Synchronous view of the cached entity, including pending optimistic
  /// patches. Never touches the network.
  pub fn cached(&self, id: &str) -> Option<R> {
    let cached = self.cache.read(&CacheKey::detail(R::KIND, id))?;
    serde_json::from_value(cached.value).ok()
  }

  /// Mark every cached entry of this kind stale.
  pub fn invalidate_all(&self) -> usize {
    self.cache.invalidate(&KeyPrefix::kind(R::KIND))
  }

  pub async fn list(&self, params: &ListParams) -> Result<Page<R>, ApiError> {
    self.list_while(params, &Liveness::always()).await
  }

  /// `list` for a consumer that may go away before the response arrives.
  pub async fn list_while(
    &self,
    params: &ListParams,
    live: &Liveness,
  ) -> Result<Page<R>, ApiError> {
    params.validate()?;
    let key = CacheKey::list(R::KIND, params);

    if let Some(cached) = self.cache.read(&key) {
      if !cached.stale {
        match serde_json::from_value::<Page<R>>(cached.value) {
          Ok(page) => return Ok(page),
          Err(e) => warn!(%key, error = %e, "discarding undecodable cached list"),
        }
      }
    }

    let ticket = self.cache.issue();
    let query = params.to_query();
    let page = self
      .retry
      .run("list", || {
        let options = RequestOptions::query(query.clone());
        async move {
          let response = self.transport.get(R::PATH, options).await?;
          let envelope = Envelope::<Vec<R>>::from_value(response.data)?;
          envelope.into_page(response.status, params)
        }
      })
      .await?;

    if let Err(violation) = page.check() {
      warn!(kind = R::KIND, %violation, "list envelope breaks pagination invariants");
    }

    if !live.is_alive() {
      debug!(%key, "consumer gone, not caching list");
      return Ok(page);
    }
    match serde_json::to_value(&page) {
      Ok(value) => {
        self.cache.write_confirmed(key, value, ticket);
      }
      Err(e) => warn!(%key, error = %e, "failed to cache list"),
    }
    Ok(page)
  }

  pub async fn get(&self, id: &str) -> Result<Option<R>, ApiError> {
    self.get_while(id, &Liveness::always()).await
  }

  /// Fetch one entity. `Ok(None)` when the server answers with no data;
  /// a 404 is an error.
  pub async fn get_while(&self, id: &str, live: &Liveness) -> Result<Option<R>, ApiError> {
    Self::require_id(id)?;
    let key = CacheKey::detail(R::KIND, id);

    if let Some(cached) = self.cache.read(&key) {
      if !cached.stale {
        match serde_json::from_value::<R>(cached.value) {
          Ok(entity) => return Ok(Some(entity)),
          Err(e) => warn!(%key, error = %e, "discarding undecodable cached entity"),
        }
      }
    }

    let ticket = self.cache.issue();
    let path = Self::detail_path(id);
    let path = path.as_str();
    let entity = self
      .retry
      .run("get", || async move {
        let response = self.transport.get(path, RequestOptions::default()).await?;
        let envelope = Envelope::<R>::from_value(response.data)?;
        envelope.into_data(response.status)
      })
      .await;

    let entity = match entity {
      Ok(entity) => entity,
      Err(err) => {
        if err.is_not_found() && live.is_alive() {
          self.cache.evict(&key);
        }
        return Err(err);
      }
    };

    if live.is_alive() {
      match &entity {
        Some(entity) => self.store(key, entity, ticket),
        None => {
          self.cache.evict(&key);
        }
      }
    }
    Ok(entity)
  }

  /// Create an entity. Lists are invalidated, never edited: where the new
  /// record lands is for the server to decide.
  pub async fn create(&self, payload: &R::Create) -> Result<R, ApiError> {
    payload.validate()?;
    let body = serde_json::to_value(payload)?;

    let ticket = self.cache.issue();
    let response = self.transport.post(R::PATH, RequestOptions::json(body)).await?;
    let envelope = Envelope::<R>::from_value(response.data)?;
    let created = envelope
      .into_data(response.status)?
      .ok_or_else(|| ApiError::decode(format!("create {} returned no data", R::KIND)))?;

    self.store(CacheKey::detail(R::KIND, created.id()), &created, ticket);
    self.invalidate_lists();
    info!(kind = R::KIND, id = created.id(), "created");
    Ok(created)
  }

  /// Update an entity, showing the patch in the cache before the server
  /// answers. Rolled back if the request fails or is rejected; kept (and
  /// marked stale) if the server accepted it without a usable entity.
  pub async fn update(&self, id: &str, patch: &R::Patch) -> Result<Option<R>, ApiError> {
    Self::require_id(id)?;
    patch.validate()?;
    let body = serde_json::to_value(patch)?;
    let key = CacheKey::detail(R::KIND, id);

    let ticket = self.cache.issue();
    let merge_body = body.clone();
    let undo = self
      .cache
      .optimistic_write(&key, move |value: &mut Value| json_patch::merge(value, &merge_body));

    let response = self
      .transport
      .put(&Self::detail_path(id), RequestOptions::json(body))
      .await;
    let response = match response {
      Ok(response) => response,
      Err(err) => {
        if let Some(token) = undo {
          let restored = self.cache.rollback(token);
          info!(kind = R::KIND, id, restored, error = %err, "update failed, rolled back");
        }
        return Err(err);
      }
    };

    let decoded =
      Envelope::<R>::from_value(response.data).and_then(|envelope| envelope.into_data(response.status));
    match decoded {
      Ok(Some(entity)) => {
        self.store_updated(key.clone(), &entity, ticket);
        if let Some(token) = undo {
          self.cache.settle(token);
        }
        self.cache.invalidate(&KeyPrefix::Exact(key));
        self.invalidate_lists();
        info!(kind = R::KIND, id, "updated");
        Ok(Some(entity))
      }
      // Accepted without echoing the entity back (204): the patch is the
      // best local picture until the next read
      Ok(None) => {
        if let Some(token) = undo {
          self.cache.commit(token);
        }
        self.cache.invalidate(&KeyPrefix::Exact(key));
        self.invalidate_lists();
        info!(kind = R::KIND, id, "updated without response body");
        Ok(None)
      }
      // The server applied the change; only its answer is unreadable
      Err(err) if err.kind == ErrorKind::Decode => {
        if let Some(token) = undo {
          self.cache.commit(token);
        }
        self.cache.invalidate(&KeyPrefix::Exact(key));
        self.invalidate_lists();
        warn!(kind = R::KIND, id, error = %err, "update applied but response undecodable");
        Err(err)
      }
      Err(err) => {
        if let Some(token) = undo {
          let restored = self.cache.rollback(token);
          info!(kind = R::KIND, id, restored, error = %err, "update rejected, rolled back");
        }
        Err(err)
      }
    }
  }

  /// Delete an entity once the server confirms it.
  pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
    Self::require_id(id)?;
    let key = CacheKey::detail(R::KIND, id);

    match self
      .transport
      .delete(&Self::detail_path(id), RequestOptions::default())
      .await
    {
      Ok(_) => {}
      Err(err) => {
        // Already gone server-side; keep the cache honest about it
        if err.is_not_found() {
          self.cache.evict(&key);
          self.invalidate_lists();
        }
        return Err(err);
      }
    }

    self.cache.evict(&key);
    self.invalidate_lists();
    info!(kind = R::KIND, id, "deleted");
    Ok(())
  }

  /// Run `action` on many entities at once. Lists and the touched entities
  /// are invalidated however the batch turned out.
  pub async fn bulk_action(&self, action: &str, ids: &[String]) -> Result<BulkResult, ApiError> {
    if action.trim().is_empty() {
      return Err(ApiError::validation("ACTION_REQUIRED", "bulk action is required"));
    }
    if ids.is_empty() {
      return Err(ApiError::validation(
        "IDS_REQUIRED",
        "bulk action needs at least one id",
      ));
    }

    let result = async {
      let body = serde_json::to_value(BulkRequest { action, ids })?;
      let response = self
        .transport
        .post(&format!("{}/bulk", R::PATH), RequestOptions::json(body))
        .await?;
      let envelope = Envelope::<BulkResult>::from_value(response.data)?;
      envelope
        .into_data(response.status)?
        .ok_or_else(|| ApiError::decode("bulk action returned no tally"))
    }
    .await;

    self.invalidate_lists();
    for id in ids {
      self
        .cache
        .invalidate(&KeyPrefix::Exact(CacheKey::detail(R::KIND, id)));
    }

    match &result {
      Ok(tally) if !tally.is_complete_success() => warn!(
        kind = R::KIND,
        action,
        failed = tally.failed,
        failed_ids = ?tally.failed_ids,
        "bulk action partially failed"
      ),
      Ok(tally) => info!(kind = R::KIND, action, total = tally.total, "bulk action done"),
      Err(err) => warn!(kind = R::KIND, action, error = %err, "bulk action failed"),
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockTransport;
  use crate::api::{ErrorKind, ListMeta, Method};
  use crate::resource::{CreateUser, UpdateUser, User};
  use serde_json::json;
  use std::time::Duration;

  fn user_json(id: &str, email: &str) -> Value {
    json!({
      "id": id,
      "tenant_id": "t1",
      "email": email,
      "name": "Ann",
      "role": "member",
      "created_at": "2026-01-01T00:00:00Z",
      "updated_at": "2026-01-01T00:00:00Z"
    })
  }

  fn list_json(users: Vec<Value>) -> Value {
    let total = users.len();
    json!({
      "data": users,
      "meta": {"total": total, "page": 1, "page_size": 20, "total_pages": 1},
      "error": null
    })
  }

  fn hooks(mock: &Arc<MockTransport>) -> ResourceHooks<User> {
    ResourceHooks::new(mock.clone(), CacheStore::new()).with_retry(RetryPolicy {
      max_retries: 2,
      backoff: Duration::ZERO,
    })
  }

  fn seed(hooks: &ResourceHooks<User>, email: &str) {
    hooks
      .cache()
      .write(CacheKey::detail("user", "u1"), user_json("u1", email));
  }

  fn email_patch(email: &str) -> UpdateUser {
    UpdateUser {
      email: Some(email.to_string()),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_list_returns_envelope_and_caches_it() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users", list_json(vec![user_json("u1", "a@x.com")]));
    let users = hooks(&mock);

    let params = ListParams::new(1, 20);
    let page = users.list(&params).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.meta, ListMeta::new(1, 1, 20));
    assert!(page.check().is_ok());

    let again = users.list(&params).await.unwrap();
    assert_eq!(again, page);
    assert_eq!(mock.count(Method::Get, "/users"), 1);

    let query = &mock.calls()[0].options.query;
    assert!(query.contains(&("page".to_string(), "1".to_string())));
    assert!(query.contains(&("page_size".to_string(), "20".to_string())));
  }

  #[tokio::test]
  async fn test_list_rejects_bad_params_locally() {
    let mock = MockTransport::new();
    let err = hooks(&mock).list(&ListParams::new(0, 20)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(mock.calls().is_empty());
  }

  #[tokio::test]
  async fn test_no_retry_on_permission_or_server_errors() {
    for status in [403, 500] {
      let mock = MockTransport::new();
      mock.always(Method::Get, "/users", Err(ApiError::from_response(status, "")));

      let err = hooks(&mock).list(&ListParams::default()).await.unwrap_err();
      assert_eq!(err.status, Some(status));
      assert_eq!(mock.count(Method::Get, "/users"), 1);
    }
  }

  #[tokio::test]
  async fn test_network_failures_retry_twice() {
    let mock = MockTransport::new();
    mock.always(Method::Get, "/users", Err(ApiError::network("connection refused")));

    let err = hooks(&mock).list(&ListParams::default()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(mock.count(Method::Get, "/users"), 3);
  }

  #[tokio::test]
  async fn test_get_requires_id() {
    let mock = MockTransport::new();
    let err = hooks(&mock).get("  ").await.unwrap_err();
    assert_eq!(err.code, "ID_REQUIRED");
    assert!(mock.calls().is_empty());
  }

  #[tokio::test]
  async fn test_get_not_found_and_null() {
    let mock = MockTransport::new();
    mock.fail(Method::Get, "/users/u404", ApiError::not_found("user not found"));
    mock.reply(Method::Get, "/users/u0", json!({"data": null, "meta": null, "error": null}));
    let users = hooks(&mock);

    assert!(users.get("u404").await.unwrap_err().is_not_found());
    assert_eq!(users.get("u0").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_create_validates_before_request() {
    let mock = MockTransport::new();
    let payload = CreateUser {
      email: "bad".to_string(),
      name: "Ann".to_string(),
      password: "long enough".to_string(),
      role: None,
    };

    let err = hooks(&mock).create(&payload).await.unwrap_err();
    assert_eq!(err.code, "INVALID_EMAIL_FORMAT");
    assert!(mock.calls().is_empty());
  }

  #[tokio::test]
  async fn test_create_then_get_round_trip_and_list_invalidated() {
    let mock = MockTransport::new();
    mock.always(Method::Get, "/users", Ok(list_json(vec![])));
    mock.reply(Method::Post, "/users", json!({"data": user_json("u9", "new@x.com")}));
    let users = hooks(&mock);

    users.list(&ListParams::default()).await.unwrap();

    let payload = CreateUser {
      email: "new@x.com".to_string(),
      name: "Ann".to_string(),
      password: "long enough".to_string(),
      role: Some("member".to_string()),
    };
    let created = users.create(&payload).await.unwrap();
    assert_eq!(created.id, "u9");

    // Served from the cache: the server's record carries every submitted field
    let fetched = users.get("u9").await.unwrap().unwrap();
    assert_eq!(fetched.email, payload.email);
    assert_eq!(fetched.name, payload.name);
    assert_eq!(fetched.role, payload.role);
    assert_eq!(mock.count(Method::Get, "/users/u9"), 0);

    // The list was invalidated rather than edited
    users.list(&ListParams::default()).await.unwrap();
    assert_eq!(mock.count(Method::Get, "/users"), 2);
  }

  #[tokio::test]
  async fn test_update_is_visible_immediately_and_rolls_back() {
    let mock = MockTransport::new();
    let users = hooks(&mock);
    seed(&users, "old@x.com");
    let gate = mock.gate(Method::Put, "/users/u1");

    let task = {
      let users = users.clone();
      tokio::spawn(async move { users.update("u1", &email_patch("new@x.com")).await })
    };
    mock.received(1).await;

    assert_eq!(users.cached("u1").unwrap().email, "new@x.com");

    gate.fail(ApiError::from_response(500, ""));
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);

    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.value, user_json("u1", "old@x.com"));
    assert_eq!(cached.pending, 0);
  }

  #[tokio::test]
  async fn test_update_success_confirms_and_invalidates() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users", list_json(vec![user_json("u1", "old@x.com")]));
    mock.reply(Method::Put, "/users/u1", json!({"data": user_json("u1", "new@x.com")}));
    let users = hooks(&mock);
    seed(&users, "old@x.com");
    users.list(&ListParams::default()).await.unwrap();

    let updated = users.update("u1", &email_patch("new@x.com")).await.unwrap();
    assert_eq!(updated.unwrap().email, "new@x.com");

    let detail = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(detail.value["email"], "new@x.com");
    assert_eq!(detail.pending, 0);
    assert!(detail.stale);

    let list = users
      .cache()
      .read(&CacheKey::list("user", &ListParams::default()))
      .unwrap();
    assert!(list.stale);
  }

  #[tokio::test]
  async fn test_later_update_wins_even_when_it_settles_first() {
    let mock = MockTransport::new();
    let users = hooks(&mock);
    seed(&users, "e0@x.com");
    let gate_a = mock.gate(Method::Put, "/users/u1");
    let gate_b = mock.gate(Method::Put, "/users/u1");

    let first = {
      let users = users.clone();
      tokio::spawn(async move { users.update("u1", &email_patch("a@x.com")).await })
    };
    mock.received(1).await;
    let second = {
      let users = users.clone();
      tokio::spawn(async move { users.update("u1", &email_patch("b@x.com")).await })
    };
    mock.received(2).await;
    assert_eq!(users.cached("u1").unwrap().email, "b@x.com");

    gate_b.ok(json!({"data": user_json("u1", "b@x.com")}));
    second.await.unwrap().unwrap();
    gate_a.ok(json!({"data": user_json("u1", "a@x.com")}));
    first.await.unwrap().unwrap();

    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.value["email"], "b@x.com");
    assert_eq!(cached.pending, 0);
  }

  #[tokio::test]
  async fn test_failed_update_does_not_undo_newer_confirmed_update() {
    let mock = MockTransport::new();
    let users = hooks(&mock);
    seed(&users, "e0@x.com");
    let gate_a = mock.gate(Method::Put, "/users/u1");
    let gate_b = mock.gate(Method::Put, "/users/u1");

    let first = {
      let users = users.clone();
      tokio::spawn(async move { users.update("u1", &email_patch("a@x.com")).await })
    };
    mock.received(1).await;
    let second = {
      let users = users.clone();
      tokio::spawn(async move { users.update("u1", &email_patch("b@x.com")).await })
    };
    mock.received(2).await;

    gate_b.ok(json!({"data": user_json("u1", "b@x.com")}));
    second.await.unwrap().unwrap();
    gate_a.fail(ApiError::network("timeout"));
    assert!(first.await.unwrap().is_err());

    assert_eq!(users.cached("u1").unwrap().email, "b@x.com");
  }

  #[tokio::test]
  async fn test_delete_waits_for_confirmation() {
    let mock = MockTransport::new();
    mock.fail(Method::Delete, "/users/u1", ApiError::from_response(403, ""));
    mock.reply(Method::Delete, "/users/u1", Value::Null);
    let users = hooks(&mock);
    seed(&users, "a@x.com");

    let err = users.delete("u1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Permission);
    assert!(users.cached("u1").is_some());

    users.delete("u1").await.unwrap();
    assert!(users.cached("u1").is_none());
  }

  #[tokio::test]
  async fn test_bulk_action_tally_and_invalidation() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users", list_json(vec![]));
    mock.reply(
      Method::Post,
      "/users/bulk",
      json!({"data": {"total": 3, "success": 2, "failed": 1, "failed_ids": ["u3"]}}),
    );
    mock.fail(Method::Post, "/users/bulk", ApiError::from_response(500, ""));
    let users = hooks(&mock);
    seed(&users, "a@x.com");
    users.list(&ListParams::default()).await.unwrap();
    let ids = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];

    let tally = users.bulk_action("deactivate", &ids).await.unwrap();
    assert_eq!(
      tally,
      BulkResult {
        total: 3,
        success: 2,
        failed: 1,
        failed_ids: vec!["u3".to_string()],
      }
    );
    let body = mock.calls().last().unwrap().options.body.clone().unwrap();
    assert_eq!(body, json!({"action": "deactivate", "ids": ["u1", "u2", "u3"]}));

    let list_key = CacheKey::list("user", &ListParams::default());
    assert!(users.cache().read(&list_key).unwrap().stale);
    assert!(users.cache().read(&CacheKey::detail("user", "u1")).unwrap().stale);

    // A failed batch still invalidates
    users.cache().write(list_key.clone(), json!({}));
    assert!(users.bulk_action("deactivate", &ids).await.is_err());
    assert!(users.cache().read(&list_key).unwrap().stale);
  }

  #[tokio::test]
  async fn test_bulk_action_needs_ids() {
    let mock = MockTransport::new();
    let err = hooks(&mock).bulk_action("delete", &[]).await.unwrap_err();
    assert_eq!(err.code, "IDS_REQUIRED");
    assert!(mock.calls().is_empty());
  }

  #[tokio::test]
  async fn test_list_after_consumer_gone_is_not_cached() {
    let mock = MockTransport::new();
    let users = hooks(&mock);
    let gate = mock.gate(Method::Get, "/users");
    let live = Liveness::new();

    let task = {
      let users = users.clone();
      let live = live.clone();
      tokio::spawn(async move { users.list_while(&ListParams::default(), &live).await })
    };
    mock.received(1).await;
    live.cancel();
    gate.ok(list_json(vec![user_json("u1", "a@x.com")]));

    assert!(task.await.unwrap().is_ok());
    assert!(users.cache().is_empty());
  }

  #[tokio::test]
  async fn test_update_with_empty_response_keeps_patch() {
    let mock = MockTransport::new();
    mock.reply(Method::Put, "/users/u1", Value::Null);
    let users = hooks(&mock);
    seed(&users, "old@x.com");

    let updated = users.update("u1", &email_patch("new@x.com")).await.unwrap();
    assert_eq!(updated, None);

    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.value["email"], "new@x.com");
    assert_eq!(cached.pending, 0);
    assert!(cached.stale);
  }

  #[tokio::test]
  async fn test_update_with_undecodable_response_is_not_rolled_back() {
    let mock = MockTransport::new();
    mock.reply(Method::Put, "/users/u1", json!({"data": {"id": 5}}));
    let users = hooks(&mock);
    seed(&users, "old@x.com");

    let err = users.update("u1", &email_patch("new@x.com")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Decode);

    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.value["email"], "new@x.com");
    assert_eq!(cached.pending, 0);
    assert!(cached.stale);
  }

  #[tokio::test]
  async fn test_update_without_cached_entity() {
    let mock = MockTransport::new();
    mock.reply(Method::Put, "/users/u1", json!({"data": user_json("u1", "new@x.com")}));
    let users = hooks(&mock);

    let updated = users.update("u1", &email_patch("new@x.com")).await.unwrap();
    assert_eq!(updated.unwrap().email, "new@x.com");

    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.value["email"], "new@x.com");
    assert_eq!(cached.pending, 0);
  }

  #[tokio::test]
  async fn test_failed_update_without_cached_entity_leaves_cache_empty() {
    let mock = MockTransport::new();
    mock.fail(Method::Put, "/users/u1", ApiError::from_response(422, ""));
    let users = hooks(&mock);

    let err = users.update("u1", &email_patch("new@x.com")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(users.cache().is_empty());
  }

  #[tokio::test]
  async fn test_refetch_during_update_keeps_patch_visible() {
    let mock = MockTransport::new();
    let users = hooks(&mock);
    seed(&users, "old@x.com");
    users.invalidate_all();
    let gate = mock.gate(Method::Put, "/users/u1");
    mock.reply(Method::Get, "/users/u1", json!({"data": user_json("u1", "old@x.com")}));

    let task = {
      let users = users.clone();
      tokio::spawn(async move { users.update("u1", &email_patch("new@x.com")).await })
    };
    mock.received(1).await;

    // The server has not applied the update yet
    let fetched = users.get("u1").await.unwrap().unwrap();
    assert_eq!(fetched.email, "old@x.com");
    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.value["email"], "new@x.com");
    assert_eq!(cached.pending, 1);

    gate.ok(json!({"data": user_json("u1", "new@x.com")}));
    assert_eq!(task.await.unwrap().unwrap().unwrap().email, "new@x.com");

    // Nothing optimistic is left, and the next read goes back to the server
    let cached = users.cache().read(&CacheKey::detail("user", "u1")).unwrap();
    assert_eq!(cached.pending, 0);
    assert!(cached.stale);
  }

  #[tokio::test]
  async fn test_delete_of_missing_entity_still_evicts_and_invalidates() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users", list_json(vec![user_json("u1", "a@x.com")]));
    mock.fail(Method::Delete, "/users/u1", ApiError::not_found("user not found"));
    let users = hooks(&mock);
    seed(&users, "a@x.com");
    users.list(&ListParams::default()).await.unwrap();

    let err = users.delete("u1").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(users.cached("u1").is_none());
    let list = users
      .cache()
      .read(&CacheKey::list("user", &ListParams::default()))
      .unwrap();
    assert!(list.stale);
  }

  #[tokio::test]
  async fn test_get_with_null_data_evicts_cached_entity() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/users/u1", json!({"data": null}));
    let users = hooks(&mock);
    seed(&users, "a@x.com");
    users.invalidate_all();

    assert_eq!(users.get("u1").await.unwrap(), None);
    assert!(users.cached("u1").is_none());
  }
}
