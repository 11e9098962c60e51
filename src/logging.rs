//! File logging for the CLI.
//!
//! The CLI prints results on stdout, so log output goes to a daily-rolling
//! file instead. `RUST_LOG` wins over the configured filter.

use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "datapipe.log";

/// Install the global subscriber. Keep the returned guard alive until exit;
/// dropping it flushes the writer.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let directory = log_directory(config)?;
  std::fs::create_dir_all(&directory)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

  let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true);

  tracing_subscriber::registry()
    .with(env_filter(&config.filter))
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

fn env_filter(fallback: &str) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(fallback))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn log_directory(config: &LogConfig) -> Result<PathBuf> {
  if let Some(directory) = &config.directory {
    return Ok(directory.clone());
  }
  dirs::state_dir()
    .or_else(dirs::data_local_dir)
    .map(|dir| dir.join("datapipe"))
    .ok_or_else(|| eyre!("Could not determine log directory"))
}
