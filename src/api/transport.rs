//! The REST transport seam.
//!
//! The hook layer and the cache only ever see [`RestTransport`]; nothing
//! above this trait knows about headers, cookies or connections.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

use super::error::ApiError;

/// HTTP verbs used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

/// Per-request options: query string and JSON body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
}

impl RequestOptions {
  pub fn query(query: Vec<(String, String)>) -> Self {
    Self { query, body: None }
  }

  pub fn json(body: Value) -> Self {
    Self {
      query: Vec::new(),
      body: Some(body),
    }
  }
}

/// A request relative to the versioned API base path.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub options: RequestOptions,
}

/// A successful response: status plus decoded JSON body (`Null` for 204).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub data: Value,
}

/// Raw body chunks of a streaming response.
pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

#[async_trait]
pub trait RestTransport: Send + Sync {
  /// Issue a request. Non-success statuses come back as `Err`.
  async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;

  /// Open a long-lived streaming response (server-sent events).
  async fn open_stream(&self, path: &str) -> Result<ByteStream, ApiError>;

  /// Scope subsequent requests to a tenant. `None` clears the scope.
  fn set_tenant(&self, _tenant: Option<&str>) {}

  async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
    self.send(Method::Get, path, options).await
  }

  async fn post(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
    self.send(Method::Post, path, options).await
  }

  async fn put(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
    self.send(Method::Put, path, options).await
  }

  async fn patch(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
    self.send(Method::Patch, path, options).await
  }

  async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
    self.send(Method::Delete, path, options).await
  }

  async fn send(
    &self,
    method: Method,
    path: &str,
    options: RequestOptions,
  ) -> Result<ApiResponse, ApiError> {
    self
      .request(ApiRequest {
        method,
        path: path.to_string(),
        options,
      })
      .await
  }
}
