use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Environment variable overriding the `-v` derived filter
const LOG_ENV: &str = "SHELLCACHE_LOG";

/// Install the global subscriber: stderr always, plus `log_file` when given.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the whole run.
pub fn init(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let default_level = match verbose {
    0 => "shellcache=warn",
    1 => "shellcache=info",
    _ => "shellcache=debug",
  };
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

  let stderr = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time();

  let (file, guard) = match log_file {
    Some(path) => {
      let path = if path.is_relative() {
        Config::data_dir()?.join(path)
      } else {
        path.to_path_buf()
      };
      let dir = path
        .parent()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      let layer = fmt::layer().with_writer(writer).with_ansi(false);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr)
    .with(file)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
