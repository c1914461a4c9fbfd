//! Logging setup for applications embedding wrangle.
//!
//! The engine only emits `tracing` events: step execution and inference
//! choices at `debug`, source detection and save/load at `info`, tolerated
//! data problems (ragged rows, duplicate headers, literals that do not fit a
//! column) at `warn`. Call [`init`] once at startup to route them to the
//! console and to daily-rotated files:
//!
//! - `wrangle.<date>.log`: every event that passes the filter
//! - `error.<date>.log`: warnings and errors only
//!
//! ```no_run
//! wrangle::logging::init().expect("Failed to initialize logging");
//! tracing::info!("ready");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "wrangle";
const ERROR_LOG_PREFIX: &str = "error";

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for the rotated files; the platform data directory when `None`
    pub directory: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Also print events to stdout
    pub console: bool,
    /// Rotated files kept per log
    pub max_files: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            directory: None,
            default_filter: "info".to_owned(),
            console: true,
            max_files: 10,
        }
    }
}

/// `<data dir>/wrangle/logs`, created on first use.
///
/// # Errors
///
/// Returns error if the platform has no data directory or the directory
/// cannot be created.
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    let log_dir = base_dir.join(APP_DIR).join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    Ok(log_dir)
}

fn appender(dir: &Path, prefix: &str, max_files: usize) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(max_files)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create {prefix} log appender in {}", dir.display()))
}

/// Build the subscriber described by `options` without installing it.
///
/// # Errors
///
/// Returns error if the log directory, the file appenders or the filter
/// cannot be created.
pub fn subscriber(options: &LogOptions) -> Result<impl Subscriber + Send + Sync + use<>> {
    let log_dir = match &options.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            dir.clone()
        }
        None => get_log_dir()?,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.default_filter))
        .with_context(|| format!("Invalid log filter '{}'", options.default_filter))?;

    let stdout_layer = options
        .console
        .then(|| fmt::layer().with_target(true).with_line_number(true).pretty());

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, APP_DIR, options.max_files)?);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, ERROR_LOG_PREFIX, options.max_files)?)
        .with_filter(EnvFilter::new("warn"));

    Ok(tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(all_logs_layer)
        .with(error_logs_layer))
}

/// Install the default subscriber: `info` unless `RUST_LOG` says otherwise,
/// console plus files under [`get_log_dir`].
///
/// # Errors
///
/// See [`init_with`].
pub fn init() -> Result<()> {
    init_with(&LogOptions::default())
}

/// Install the subscriber described by `options` as the global default.
///
/// # Errors
///
/// Returns error if the subscriber cannot be built or a global subscriber is
/// already installed.
pub fn init_with(options: &LogOptions) -> Result<()> {
    subscriber(options)?
        .try_init()
        .context("A global tracing subscriber is already installed")?;
    tracing::info!("Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_contents(dir: &Path, prefix: &str) -> String {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .map(|path| std::fs::read_to_string(path).unwrap())
            .collect()
    }

    fn options(dir: &Path) -> LogOptions {
        LogOptions {
            directory: Some(dir.to_path_buf()),
            default_filter: "debug".to_owned(),
            console: false,
            ..LogOptions::default()
        }
    }

    #[test]
    fn test_warnings_reach_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let subscriber = subscriber(&options(dir.path())).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("opened source");
            tracing::warn!("ragged row padded");
        });

        let all = log_contents(dir.path(), "wrangle.");
        let errors = log_contents(dir.path(), "error.");
        assert!(all.contains("opened source"));
        assert!(all.contains("ragged row padded"));
        assert!(errors.contains("ragged row padded"));
        assert!(!errors.contains("opened source"));
    }

    #[test]
    fn test_init_installs_once() {
        let dir = tempfile::tempdir().unwrap();
        assert!(init_with(&options(dir.path())).is_ok());
        assert!(init_with(&options(dir.path())).is_err());
        assert!(log_contents(dir.path(), "wrangle.").contains("Logging initialized"));
    }
}
