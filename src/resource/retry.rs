use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::api::ApiError;
use crate::config::RetryConfig;

/// Bounded retry for reads.
///
/// Only failures without a response are retried. A status code, even a
/// 500, is a definite answer and goes straight back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  /// Delay before the first retry; grows linearly with each attempt
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 2,
      backoff: Duration::from_millis(250),
    }
  }
}

impl RetryPolicy {
  pub fn from_config(config: &RetryConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      backoff: Duration::from_millis(config.backoff_ms),
    }
  }

  /// A policy that tries exactly once.
  pub fn never() -> Self {
    Self {
      max_retries: 0,
      backoff: Duration::ZERO,
    }
  }

  pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, ApiError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let mut retries = 0;
    loop {
      match attempt().await {
        Ok(value) => return Ok(value),
        Err(err) if err.is_retryable() && retries < self.max_retries => {
          retries += 1;
          warn!(operation, retries, error = %err, "retrying after network failure");
          if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff * retries).await;
          }
        }
        Err(err) => return Err(err),
      }
    }
  }
}
