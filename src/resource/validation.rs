//! Client-side payload checks run before a request is issued.
//!
//! These mirror the server's own validation so obviously bad input fails
//! fast; the server remains authoritative.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static HEX_COLOR: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex"));

/// Payloads that can be checked locally before submission.
pub trait Validate {
  fn validate(&self) -> Result<(), ApiError>;
}

impl Validate for serde_json::Value {
  fn validate(&self) -> Result<(), ApiError> {
    Ok(())
  }
}

pub fn required(field: &str, value: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    return Err(
      ApiError::validation("FIELD_REQUIRED", format!("{} is required", field))
        .with_details(serde_json::json!({ "field": field })),
    );
  }
  Ok(())
}

pub fn email(field: &str, value: &str) -> Result<(), ApiError> {
  required(field, value)?;
  if !EMAIL.is_match(value.trim()) {
    return Err(
      ApiError::validation("INVALID_EMAIL_FORMAT", format!("{} is not a valid email", field))
        .with_details(serde_json::json!({ "field": field })),
    );
  }
  Ok(())
}

pub fn password(field: &str, value: &str) -> Result<(), ApiError> {
  if value.chars().count() < MIN_PASSWORD_LEN {
    return Err(
      ApiError::validation(
        "PASSWORD_TOO_SHORT",
        format!("{} must be at least {} characters", field, MIN_PASSWORD_LEN),
      )
      .with_details(serde_json::json!({ "field": field, "min_length": MIN_PASSWORD_LEN })),
    );
  }
  Ok(())
}

/// `#RRGGBB`, the same pattern the theme endpoints enforce.
pub fn hex_color(field: &str, value: &str) -> Result<(), ApiError> {
  if !HEX_COLOR.is_match(value) {
    return Err(
      ApiError::validation(
        "INVALID_COLOR_FORMAT",
        format!("{} must be a #RRGGBB hex color", field),
      )
      .with_details(serde_json::json!({ "field": field, "value": value })),
    );
  }
  Ok(())
}
