//! Logging setup
//!
//! Two layers share one `EnvFilter` (default `info`, `RUST_LOG` overrides):
//! readable lines on stdout, and JSON lines appended to a file named after
//! the start time in milliseconds.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;

/// `<dir>/<unix millis>.log`
pub fn log_file_path(dir: &Path, started: SystemTime) -> PathBuf {
    let millis = started
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    dir.join(format!("{}.log", millis))
}

/// Install the global subscriber and return the log file path
pub fn init(dir: &Path) -> Result<PathBuf, CliError> {
    std::fs::create_dir_all(dir)?;
    let path = log_file_path(dir, SystemTime::now());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().without_time().with_target(false);
    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    Ok(path)
}
