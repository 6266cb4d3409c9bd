use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::envelope::Envelope;
use crate::api::{ApiError, RequestOptions, RestTransport};
use crate::cache::{CacheKey, CacheStore};

use super::retry::RetryPolicy;
use super::validation::{self, Validate};

const THEME_PATH: &str = "/settings/theme";

/// Tenant-wide theme configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSettings {
  pub primary_color: String,
  pub secondary_color: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub accent_color: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logo_url: Option<String>,
}

impl Validate for ThemeSettings {
  fn validate(&self) -> Result<(), ApiError> {
    validation::hex_color("primary_color", &self.primary_color)?;
    validation::hex_color("secondary_color", &self.secondary_color)?;
    if let Some(accent) = &self.accent_color {
      validation::hex_color("accent_color", accent)?;
    }
    Ok(())
  }
}

/// Reads and saves the tenant's single theme document.
#[derive(Clone)]
pub struct ThemeClient {
  transport: Arc<dyn RestTransport>,
  cache: CacheStore,
  retry: RetryPolicy,
}

impl ThemeClient {
  pub fn new(transport: Arc<dyn RestTransport>, cache: CacheStore) -> Self {
    Self {
      transport,
      cache,
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  fn key() -> CacheKey {
    CacheKey::detail("theme", "current")
  }

  pub async fn get(&self) -> Result<ThemeSettings, ApiError> {
    if let Some(cached) = self.cache.read(&Self::key()) {
      if !cached.stale {
        if let Ok(theme) = serde_json::from_value(cached.value) {
          return Ok(theme);
        }
      }
    }

    let ticket = self.cache.issue();
    let theme = self
      .retry
      .run("theme", || async move {
        let response = self.transport.get(THEME_PATH, RequestOptions::default()).await?;
        Envelope::<ThemeSettings>::from_value(response.data)?.into_data(response.status)
      })
      .await?
      .ok_or_else(|| ApiError::not_found("no theme configured"))?;

    self
      .cache
      .write_confirmed(Self::key(), serde_json::to_value(&theme)?, ticket);
    Ok(theme)
  }

  /// Save the theme. Colors are checked against `#RRGGBB` before anything
  /// is sent.
  pub async fn save(&self, theme: &ThemeSettings) -> Result<ThemeSettings, ApiError> {
    theme.validate()?;

    let ticket = self.cache.issue();
    let body = serde_json::to_value(theme)?;
    let response = self.transport.put(THEME_PATH, RequestOptions::json(body)).await?;
    let saved = Envelope::<ThemeSettings>::from_value(response.data)?
      .into_data(response.status)?
      .unwrap_or_else(|| theme.clone());

    self
      .cache
      .write_confirmed(Self::key(), serde_json::to_value(&saved)?, ticket);
    info!(primary = %saved.primary_color, "theme saved");
    Ok(saved)
  }
}
