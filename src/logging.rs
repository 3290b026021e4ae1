use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

/// Environment variable holding a tracing filter, e.g. `linr=debug`.
pub const LOG_ENV: &str = "LINR_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Filter directives to use: the environment wins, then config, then `warn`.
pub fn filter_directives(from_env: Option<String>, configured: Option<&str>) -> String {
  from_env
    .filter(|v| !v.trim().is_empty())
    .or_else(|| configured.map(String::from))
    .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber.
///
/// Logs go to stderr so stdout stays parseable. When a log file is given,
/// events are also written there through a non-blocking appender; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init(config: &LogConfig, file_override: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let directives = filter_directives(std::env::var(LOG_ENV).ok(), config.filter.as_deref());
  let filter = EnvFilter::try_new(&directives)
    .map_err(|e| eyre!("Invalid log filter '{}': {}", directives, e))?;

  let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let Some(path) = file_override.or(config.file.as_deref()) else {
    tracing_subscriber::registry()
      .with(filter)
      .with(stderr)
      .try_init()
      .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    return Ok(None);
  };

  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or(Path::new("."));
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(Some(guard))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filter_precedence() {
    assert_eq!(filter_directives(None, None), "warn");
    assert_eq!(filter_directives(None, Some("linr=info")), "linr=info");
    assert_eq!(
      filter_directives(Some("debug".into()), Some("linr=info")),
      "debug"
    );
    // Blank env value is ignored
    assert_eq!(filter_directives(Some("  ".into()), Some("info")), "info");
  }

  #[test]
  fn test_default_directives_parse() {
    assert!(EnvFilter::try_new(filter_directives(None, None)).is_ok());
  }
}
