//! Serde types for the `{data, meta, error}` envelope and list queries.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{ApiError, ErrorBody};

/// Standard response wrapper used by every list and detail endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Envelope<T> {
  #[serde(default)]
  pub data: Option<T>,
  #[serde(default)]
  pub meta: Option<ListMeta>,
  #[serde(default)]
  pub error: Option<ErrorBody>,
}

impl<T: DeserializeOwned> Envelope<T> {
  /// Decode a response body. An empty body (204) is an envelope with no data.
  pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
    if value.is_null() {
      return Ok(Self {
        data: None,
        meta: None,
        error: None,
      });
    }
    Ok(serde_json::from_value(value)?)
  }
}

impl<T> Envelope<T> {
  /// Unwrap the payload, surfacing an in-band error body as an [`ApiError`].
  pub fn into_data(self, status: u16) -> Result<Option<T>, ApiError> {
    match self.error {
      Some(body) => Err(ApiError::from_body(status, body)),
      None => Ok(self.data),
    }
  }
}

impl<T> Envelope<Vec<T>> {
  /// Unwrap a list payload. Servers that omit `meta` get one synthesized
  /// from the request parameters.
  pub fn into_page(self, status: u16, params: &ListParams) -> Result<Page<T>, ApiError> {
    if let Some(body) = self.error {
      return Err(ApiError::from_body(status, body));
    }
    let data = self.data.unwrap_or_default();
    let meta = self
      .meta
      .unwrap_or_else(|| ListMeta::new(data.len() as u64, params.page, params.page_size));
    Ok(Page { data, meta })
  }
}

/// Pagination metadata of a list envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMeta {
  pub total: u64,
  pub page: u32,
  pub page_size: u32,
  pub total_pages: u64,
}

impl ListMeta {
  pub fn new(total: u64, page: u32, page_size: u32) -> Self {
    Self {
      total,
      page,
      page_size,
      total_pages: Self::pages_for(total, page_size),
    }
  }

  /// `ceil(total / page_size)`
  pub fn pages_for(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
      return 0;
    }
    total.div_ceil(u64::from(page_size))
  }
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub data: Vec<T>,
  pub meta: ListMeta,
}

impl<T> Page<T> {
  /// Check the envelope invariants, describing the first violation found.
  pub fn check(&self) -> Result<(), String> {
    if self.data.len() as u64 > u64::from(self.meta.page_size) {
      return Err(format!(
        "page holds {} items but page_size is {}",
        self.data.len(),
        self.meta.page_size
      ));
    }
    let expected = ListMeta::pages_for(self.meta.total, self.meta.page_size);
    if self.meta.total_pages != expected {
      return Err(format!(
        "total_pages is {} but {} items at page_size {} make {}",
        self.meta.total_pages, self.meta.total, self.meta.page_size, expected
      ));
    }
    Ok(())
  }
}

/// Pagination plus resource-specific filters for a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
  pub page: u32,
  pub page_size: u32,
  pub filters: BTreeMap<String, String>,
}

impl Default for ListParams {
  fn default() -> Self {
    Self {
      page: 1,
      page_size: 20,
      filters: BTreeMap::new(),
    }
  }
}

impl ListParams {
  pub fn new(page: u32, page_size: u32) -> Self {
    Self {
      page,
      page_size,
      filters: BTreeMap::new(),
    }
  }

  pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.filters.insert(name.into(), value.into());
    self
  }

  pub fn validate(&self) -> Result<(), ApiError> {
    if self.page < 1 {
      return Err(ApiError::validation("INVALID_PAGE", "page must be at least 1"));
    }
    if self.page_size < 1 {
      return Err(ApiError::validation(
        "INVALID_PAGE_SIZE",
        "page_size must be at least 1",
      ));
    }
    Ok(())
  }

  /// Query string pairs. Empty filter values are dropped.
  pub fn to_query(&self) -> Vec<(String, String)> {
    let mut query = vec![
      ("page".to_string(), self.page.to_string()),
      ("page_size".to_string(), self.page_size.to_string()),
    ];
    for (name, value) in &self.filters {
      let value = value.trim();
      if !value.is_empty() {
        query.push((name.clone(), value.to_string()));
      }
    }
    query
  }

  /// Stable, fixed-length hash identifying this query in the cache.
  pub fn cache_hash(&self) -> String {
    let normalized = self
      .to_query()
      .into_iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join("&");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Body of a bulk action request.
#[derive(Debug, Clone, Serialize)]
pub struct BulkRequest<'a> {
  pub action: &'a str,
  pub ids: &'a [String],
}

/// Per-id tally returned by bulk endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
  pub total: u64,
  pub success: u64,
  pub failed: u64,
  #[serde(default)]
  pub failed_ids: Vec<String>,
}

impl BulkResult {
  pub fn is_complete_success(&self) -> bool {
    self.failed == 0
  }
}
