use std::fmt;

use crate::api::ListParams;

/// What a cache key points at within a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
  /// A single entity by id
  Detail(String),
  /// One list query, identified by its normalized query hash
  List(String),
}

/// Key of a cache entry: `(resource_kind, id)` or `(resource_kind, query)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub kind: String,
  pub scope: KeyScope,
}

impl CacheKey {
  pub fn detail(kind: &str, id: &str) -> Self {
    Self {
      kind: kind.to_string(),
      scope: KeyScope::Detail(id.to_string()),
    }
  }

  pub fn list(kind: &str, params: &ListParams) -> Self {
    Self {
      kind: kind.to_string(),
      scope: KeyScope::List(params.cache_hash()),
    }
  }

  pub fn is_list(&self) -> bool {
    matches!(self.scope, KeyScope::List(_))
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.scope {
      KeyScope::Detail(id) => write!(f, "{}:detail:{}", self.kind, id),
      KeyScope::List(hash) => write!(f, "{}:list:{}", self.kind, hash.get(..12).unwrap_or(hash)),
    }
  }
}

/// Selects the entries an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix {
  /// Every entry
  All,
  /// Every entry of a resource kind
  Kind(String),
  /// Every list entry of a resource kind
  Lists(String),
  /// Exactly one entry
  Exact(CacheKey),
}

impl KeyPrefix {
  pub fn kind(kind: &str) -> Self {
    KeyPrefix::Kind(kind.to_string())
  }

  pub fn lists(kind: &str) -> Self {
    KeyPrefix::Lists(kind.to_string())
  }

  pub fn matches(&self, key: &CacheKey) -> bool {
    match self {
      KeyPrefix::All => true,
      KeyPrefix::Kind(kind) => key.kind == *kind,
      KeyPrefix::Lists(kind) => key.kind == *kind && key.is_list(),
      KeyPrefix::Exact(exact) => exact == key,
    }
  }
}

impl From<CacheKey> for KeyPrefix {
  fn from(key: CacheKey) -> Self {
    KeyPrefix::Exact(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_prefix_matching() {
    let detail = CacheKey::detail("user", "u1");
    let detail_other = CacheKey::detail("user", "u10");
    let list = CacheKey::list("user", &ListParams::default());
    let task = CacheKey::detail("task", "u1");

    assert!(KeyPrefix::All.matches(&task));
    assert!(KeyPrefix::kind("user").matches(&detail));
    assert!(KeyPrefix::kind("user").matches(&list));
    assert!(!KeyPrefix::kind("user").matches(&task));

    assert!(KeyPrefix::lists("user").matches(&list));
    assert!(!KeyPrefix::lists("user").matches(&detail));

    let exact = KeyPrefix::from(detail.clone());
    assert!(exact.matches(&detail));
    assert!(!exact.matches(&detail_other));
  }

  #[test]
  fn test_display() {
    assert_eq!(CacheKey::detail("user", "u1").to_string(), "user:detail:u1");
    assert!(CacheKey::list("task", &ListParams::default())
      .to_string()
      .starts_with("task:list:"));
  }

  #[test]
  fn test_display_of_short_or_multibyte_hash() {
    let key = |hash: &str| CacheKey {
      kind: "user".to_string(),
      scope: KeyScope::List(hash.to_string()),
    };
    assert_eq!(key("abc").to_string(), "user:list:abc");
    assert_eq!(key("0123456789abcdef").to_string(), "user:list:0123456789ab");
    // Byte 12 falls inside a character
    assert_eq!(key("aéééééééé").to_string(), "user:list:aéééééééé");
  }
}
