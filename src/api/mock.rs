//! Scripted in-process transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{oneshot, watch};

use super::error::{ApiError, ErrorKind};
use super::transport::{ApiRequest, ApiResponse, ByteStream, Method, RestTransport};

type RouteKey = (Method, String);

enum Reply {
  Ready(Result<ApiResponse, ApiError>),
  Gated(oneshot::Receiver<Result<ApiResponse, ApiError>>),
}

/// Held by a test to decide when (and how) a gated request settles.
pub struct Gate {
  tx: oneshot::Sender<Result<ApiResponse, ApiError>>,
}

impl Gate {
  pub fn ok(self, data: Value) {
    let _ = self.tx.send(Ok(ApiResponse { status: 200, data }));
  }

  pub fn fail(self, err: ApiError) {
    let _ = self.tx.send(Err(err));
  }
}

#[derive(Default)]
struct State {
  queued: HashMap<RouteKey, VecDeque<Reply>>,
  fallback: HashMap<RouteKey, Result<ApiResponse, ApiError>>,
  streams: VecDeque<Result<Vec<&'static str>, ApiError>>,
  calls: Vec<ApiRequest>,
  tenant: Option<String>,
}

pub struct MockTransport {
  state: Mutex<State>,
  call_count: watch::Sender<usize>,
}

impl MockTransport {
  pub fn new() -> Arc<Self> {
    let (call_count, _) = watch::channel(0);
    Arc::new(Self {
      state: Mutex::new(State::default()),
      call_count,
    })
  }

  /// Queue one 200 reply for a route.
  pub fn reply(&self, method: Method, path: &str, data: Value) {
    self.push(method, path, Reply::Ready(Ok(ApiResponse { status: 200, data })));
  }

  /// Queue one failure for a route.
  pub fn fail(&self, method: Method, path: &str, err: ApiError) {
    self.push(method, path, Reply::Ready(Err(err)));
  }

  /// Queue a reply that settles only when the returned gate is released.
  pub fn gate(&self, method: Method, path: &str) -> Gate {
    let (tx, rx) = oneshot::channel();
    self.push(method, path, Reply::Gated(rx));
    Gate { tx }
  }

  /// Answer every otherwise unscripted call on a route with the same result.
  pub fn always(&self, method: Method, path: &str, result: Result<Value, ApiError>) {
    let result = result.map(|data| ApiResponse { status: 200, data });
    self
      .state
      .lock()
      .unwrap()
      .fallback
      .insert((method, path.to_string()), result);
  }

  /// Queue the chunks of one streaming response.
  pub fn stream(&self, chunks: Result<Vec<&'static str>, ApiError>) {
    self.state.lock().unwrap().streams.push_back(chunks);
  }

  pub fn calls(&self) -> Vec<ApiRequest> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn count(&self, method: Method, path: &str) -> usize {
    self
      .state
      .lock()
      .unwrap()
      .calls
      .iter()
      .filter(|c| c.method == method && c.path == path)
      .count()
  }

  pub fn tenant(&self) -> Option<String> {
    self.state.lock().unwrap().tenant.clone()
  }

  /// Resolve once at least `n` requests have been received.
  pub async fn received(&self, n: usize) {
    let mut rx = self.call_count.subscribe();
    let _ = rx.wait_for(|count| *count >= n).await;
  }

  fn push(&self, method: Method, path: &str, reply: Reply) {
    self
      .state
      .lock()
      .unwrap()
      .queued
      .entry((method, path.to_string()))
      .or_default()
      .push_back(reply);
  }
}

#[async_trait]
impl RestTransport for MockTransport {
  async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
    let reply = {
      let mut state = self.state.lock().unwrap();
      let key = (request.method, request.path.clone());
      state.calls.push(request);
      let queued = state.queued.get_mut(&key).and_then(|q| q.pop_front());
      match queued {
        Some(reply) => reply,
        None => Reply::Ready(state.fallback.get(&key).cloned().unwrap_or_else(|| {
          let mut err = ApiError::new(ErrorKind::Server, "UNSCRIPTED", format!("{:?}", key));
          err.status = Some(500);
          Err(err)
        })),
      }
    };
    self.call_count.send_modify(|count| *count += 1);

    match reply {
      Reply::Ready(result) => result,
      Reply::Gated(rx) => rx
        .await
        .unwrap_or_else(|_| Err(ApiError::network("gate dropped"))),
    }
  }

  async fn open_stream(&self, _path: &str) -> Result<ByteStream, ApiError> {
    let next = self.state.lock().unwrap().streams.pop_front();
    let chunks = next.unwrap_or_else(|| Err(ApiError::network("no stream scripted")))?;
    Ok(
      futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))))
        .boxed(),
    )
  }

  fn set_tenant(&self, tenant: Option<&str>) {
    self.state.lock().unwrap().tenant = tenant.map(String::from);
  }
}
