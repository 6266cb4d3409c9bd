//! Typed API errors.
//!
//! Every failure the data layer can report is an [`ApiError`]. Transport and
//! HTTP failures are classified once, at the REST client boundary, so callers
//! always receive a stable `{status, code, message}` shape no matter where the
//! failure came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure classes surfaced to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Rejected input: local validation or a 4xx the server explains with a code
  Validation,
  /// 401 / 403
  Permission,
  /// 404
  NotFound,
  /// No response at all (connect, timeout, interrupted body)
  Network,
  /// 5xx
  Server,
  /// Response arrived but could not be decoded
  Decode,
}

impl ErrorKind {
  /// Classify an HTTP status code.
  pub fn from_status(status: u16) -> Self {
    match status {
      401 | 403 => ErrorKind::Permission,
      404 => ErrorKind::NotFound,
      500..=599 => ErrorKind::Server,
      _ => ErrorKind::Validation,
    }
  }

  fn default_code(self) -> &'static str {
    match self {
      ErrorKind::Validation => "VALIDATION_FAILED",
      ErrorKind::Permission => "AUTH_INSUFFICIENT_PERMISSIONS",
      ErrorKind::NotFound => "NOT_FOUND",
      ErrorKind::Network => "NETWORK_ERROR",
      ErrorKind::Server => "SERVER_ERROR",
      ErrorKind::Decode => "DECODE_ERROR",
    }
  }
}

/// The `{error: {code, message, details?}}` body the API sends on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
  pub code: String,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

/// Error returned by every operation of the data layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
  pub kind: ErrorKind,
  /// HTTP status, absent when no response was received
  pub status: Option<u16>,
  pub code: String,
  pub message: String,
  pub details: Option<Value>,
}

impl ApiError {
  pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      kind,
      status: None,
      code: code.into(),
      message: message.into(),
      details: None,
    }
  }

  /// Local validation failure, raised before any request is issued.
  pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, code, message)
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Network, ErrorKind::Network.default_code(), message)
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Decode, ErrorKind::Decode.default_code(), message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    let mut err = Self::new(ErrorKind::NotFound, ErrorKind::NotFound.default_code(), message);
    err.status = Some(404);
    err
  }

  /// Build an error from a non-success HTTP response body.
  ///
  /// Bodies that follow the API's error envelope keep their machine-readable
  /// code; anything else falls back to a code derived from the status.
  pub fn from_response(status: u16, body: &str) -> Self {
    let kind = ErrorKind::from_status(status);
    match serde_json::from_str::<ErrorEnvelope>(body) {
      Ok(envelope) => Self::from_body(status, envelope.error),
      Err(_) => {
        let message = if body.trim().is_empty() {
          format!("HTTP {}", status)
        } else {
          format!("HTTP {}: {}", status, body.trim())
        };
        Self {
          kind,
          status: Some(status),
          code: kind.default_code().to_string(),
          message,
          details: None,
        }
      }
    }
  }

  /// Build an error from an already-decoded error body.
  pub fn from_body(status: u16, body: ErrorBody) -> Self {
    Self {
      kind: ErrorKind::from_status(status),
      status: Some(status),
      code: body.code,
      message: body.message,
      details: body.details,
    }
  }

  pub fn with_details(mut self, details: Value) -> Self {
    self.details = Some(details);
    self
  }

  /// Only ambiguous failures are worth retrying. A status code means the
  /// server saw the request and answered it.
  pub fn is_retryable(&self) -> bool {
    self.kind == ErrorKind::Network
  }

  pub fn is_not_found(&self) -> bool {
    self.kind == ErrorKind::NotFound
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      return ApiError::decode(err.to_string());
    }
    match err.status() {
      Some(status) => ApiError::from_response(status.as_u16(), ""),
      None => ApiError::network(err.to_string()),
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::decode(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert_eq!(ErrorKind::from_status(400), ErrorKind::Validation);
    assert_eq!(ErrorKind::from_status(422), ErrorKind::Validation);
    assert_eq!(ErrorKind::from_status(401), ErrorKind::Permission);
    assert_eq!(ErrorKind::from_status(403), ErrorKind::Permission);
    assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
    assert_eq!(ErrorKind::from_status(500), ErrorKind::Server);
    assert_eq!(ErrorKind::from_status(503), ErrorKind::Server);
  }

  #[test]
  fn test_envelope_body_keeps_code() {
    let body = r##"{"error":{"code":"INVALID_COLOR_FORMAT","message":"bad color","details":{"field":"primary_color"}}}"##;
    let err = ApiError::from_response(400, body);

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.status, Some(400));
    assert_eq!(err.code, "INVALID_COLOR_FORMAT");
    assert_eq!(err.message, "bad color");
    assert_eq!(err.details.unwrap()["field"], "primary_color");
  }

  #[test]
  fn test_plain_body_falls_back_to_status_code() {
    let err = ApiError::from_response(502, "Bad Gateway");
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.code, "SERVER_ERROR");
    assert_eq!(err.message, "HTTP 502: Bad Gateway");
  }

  #[test]
  fn test_only_network_errors_retry() {
    assert!(ApiError::network("connection reset").is_retryable());
    assert!(!ApiError::from_response(403, "").is_retryable());
    assert!(!ApiError::from_response(500, "").is_retryable());
    assert!(!ApiError::decode("eof").is_retryable());
  }
}
