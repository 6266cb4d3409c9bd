use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Tenant to scope requests to on startup
  pub tenant: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub notifications: NotificationsConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Server origin, e.g. https://erp.example.com
  pub base_url: String,
  /// API version segment; requests go to {base_url}/api/{version}
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds a confirmed value counts as fresh
  #[serde(default = "default_stale_time_secs")]
  pub stale_time_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: default_stale_time_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  /// Extra attempts for reads that failed without a response
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_backoff_ms")]
  pub backoff_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      backoff_ms: default_backoff_ms(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
  /// How many recent frames the inbox keeps
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self {
      buffer_size: default_buffer_size(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter when OPSDESK_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs to the data directory instead of stderr
  #[serde(default)]
  pub file: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: false,
    }
  }
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_timeout_ms() -> u64 {
  30_000
}

fn default_stale_time_secs() -> u64 {
  300
}

fn default_max_retries() -> u32 {
  2
}

fn default_backoff_ms() -> u64 {
  250
}

fn default_buffer_size() -> usize {
  50
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./opsdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/opsdesk/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/opsdesk/config.yaml\n\
                 with at least:\n  api:\n    base_url: https://erp.example.com"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("opsdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("opsdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.api.base_url.trim().is_empty() {
      return Err(eyre!("api.base_url must not be empty"));
    }
    Ok(config)
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Checks OPSDESK_API_TOKEN.
  pub fn api_token() -> Option<String> {
    std::env::var("OPSDESK_API_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
