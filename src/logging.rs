use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "OPSDESK_LOG";

/// Directory for log files: $XDG_DATA_HOME/opsdesk/logs
pub fn log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("opsdesk").join("logs"))
}

/// Install the global subscriber.
///
/// Logs go to a daily file under [`log_dir`] when `config.file` is set,
/// otherwise to stderr so they never mix with JSON output on stdout. The
/// returned guard must be held until exit to flush the file writer.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log filter {:?}: {}", config.level, e))?;

  if config.file {
    let dir = log_dir().ok_or_else(|| eyre!("Could not determine data directory for logs"))?;
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let appender = tracing_appender::rolling::daily(&dir, "opsdesk.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
      .try_init()
      .map_err(|e| eyre!("Failed to init logging: {}", e))?;
    return Ok(Some(guard));
  }

  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .try_init()
    .map_err(|e| eyre!("Failed to init logging: {}", e))?;
  Ok(None)
}
