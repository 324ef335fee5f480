//! Application logging
//!
//! Thin call surface over `tracing`. Every event carries a `context` field
//! naming the subsystem that emitted it (`installer`, `library`, ...).
//! `init` wires stdout plus a session log file under the app data directory.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::app_dirs;

/// Keeps the file writer alive; dropping it flushes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the global subscriber. The previous session's log is truncated.
pub fn init() -> Result<LoggingGuard> {
    init_in(&app_dirs::get_logs_dir())
}

pub fn init_in(log_dir: &Path) -> Result<LoggingGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    fs::write(log_dir.join(app_dirs::LOG_FILE_NAME), "")
        .context("Failed to truncate previous log file")?;

    let file_appender = tracing_appender::rolling::never(log_dir, app_dirs::LOG_FILE_NAME);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("Logging was already initialized")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

pub fn log_info(message: &str, context: Option<&str>) {
    tracing::info!(context = context.unwrap_or("app"), "{}", message);
}

pub fn log_error(message: &str, context: Option<&str>) {
    tracing::error!(context = context.unwrap_or("app"), "{}", message);
}

pub fn log_debug(message: &str, context: Option<&str>) {
    tracing::debug!(context = context.unwrap_or("app"), "{}", message);
}
