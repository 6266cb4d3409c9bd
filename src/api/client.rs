use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;

use super::error::ApiError;
use super::transport::{ApiRequest, ApiResponse, ByteStream, Method, RestTransport};

const TENANT_HEADER: &str = "x-tenant-id";

/// REST client for the versioned ERP API.
pub struct HttpClient {
  client: reqwest::Client,
  /// Origin plus versioned base path, without a trailing slash
  base_url: String,
  token: Option<String>,
  tenant: RwLock<Option<String>>,
  /// Applied per request; event streams stay open indefinitely
  timeout: Duration,
}

impl HttpClient {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
    let origin = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base url {}: {}", config.base_url, e))?;

    let mut default_headers = HeaderMap::new();
    default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let timeout = Duration::from_millis(config.timeout_ms);
    let client = reqwest::Client::builder()
      .connect_timeout(timeout)
      .default_headers(default_headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: base_path(&origin, &config.version),
      token,
      tenant: RwLock::new(None),
      timeout,
    })
  }

  /// Full URL for a path relative to the versioned base.
  pub fn endpoint(&self, path: &str) -> String {
    if path.starts_with('/') {
      format!("{}{}", self.base_url, path)
    } else {
      format!("{}/{}", self.base_url, path)
    }
  }

  pub fn tenant(&self) -> Option<String> {
    self.tenant.read().ok().and_then(|t| t.clone())
  }

  fn request_headers(&self) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(token) = &self.token {
      if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
        headers.insert(AUTHORIZATION, value);
      }
    }
    if let Some(tenant) = self.tenant() {
      if let Ok(value) = HeaderValue::from_str(&tenant) {
        headers.insert(TENANT_HEADER, value);
      }
    }
    headers
  }
}

/// `https://erp.example.com` + `v1` → `https://erp.example.com/api/v1`
fn base_path(origin: &Url, version: &str) -> String {
  let version = version.trim_matches('/');
  let origin = origin.as_str().trim_end_matches('/');
  if origin.ends_with(&format!("/api/{}", version)) {
    origin.to_string()
  } else {
    format!("{}/api/{}", origin, version)
  }
}

fn to_reqwest(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

#[async_trait]
impl RestTransport for HttpClient {
  async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
    let url = self.endpoint(&request.path);
    debug!(method = request.method.as_str(), %url, "sending request");

    let mut builder = self
      .client
      .request(to_reqwest(request.method), &url)
      .timeout(self.timeout)
      .headers(self.request_headers());
    if !request.options.query.is_empty() {
      builder = builder.query(&request.options.query);
    }
    if let Some(body) = &request.options.body {
      builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status();

    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(ApiError::from_response(status.as_u16(), &text));
    }

    // 204 No Content and empty bodies carry no envelope
    let bytes = response
      .bytes()
      .await
      .map_err(|e| ApiError::network(format!("Failed to read response body: {}", e)))?;
    let data = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes)?
    };

    Ok(ApiResponse {
      status: status.as_u16(),
      data,
    })
  }

  async fn open_stream(&self, path: &str) -> Result<ByteStream, ApiError> {
    let url = self.endpoint(path);
    debug!(%url, "opening event stream");

    let response = self
      .client
      .get(&url)
      .headers(self.request_headers())
      .header(ACCEPT, "text/event-stream")
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(ApiError::from_response(status.as_u16(), &text));
    }

    Ok(response.bytes_stream().map_err(ApiError::from).boxed())
  }

  fn set_tenant(&self, tenant: Option<&str>) {
    if let Ok(mut current) = self.tenant.write() {
      *current = tenant.map(String::from);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(base_url: &str) -> ApiConfig {
    ApiConfig {
      base_url: base_url.to_string(),
      version: "v1".to_string(),
      timeout_ms: 1_000,
    }
  }

  #[test]
  fn test_endpoint_joins_versioned_base() {
    let client = HttpClient::new(&config("https://erp.example.com/"), None).unwrap();
    assert_eq!(
      client.endpoint("/users/u1"),
      "https://erp.example.com/api/v1/users/u1"
    );
    assert_eq!(
      client.endpoint("users"),
      "https://erp.example.com/api/v1/users"
    );
  }

  #[test]
  fn test_base_path_not_duplicated() {
    let client = HttpClient::new(&config("https://erp.example.com/api/v1"), None).unwrap();
    assert_eq!(client.endpoint("/tasks"), "https://erp.example.com/api/v1/tasks");
  }

  #[test]
  fn test_invalid_base_url_rejected() {
    assert!(HttpClient::new(&config("not a url"), None).is_err());
  }

  #[test]
  fn test_headers_follow_tenant_and_token() {
    let client =
      HttpClient::new(&config("https://erp.example.com"), Some("secret".to_string())).unwrap();

    let headers = client.request_headers();
    assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
    assert!(headers.get(TENANT_HEADER).is_none());

    client.set_tenant(Some("acme"));
    assert_eq!(client.request_headers().get(TENANT_HEADER).unwrap(), "acme");

    client.set_tenant(None);
    assert!(client.request_headers().get(TENANT_HEADER).is_none());
  }
}
