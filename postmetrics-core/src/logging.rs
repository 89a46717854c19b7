//! Logging for postmetrics
//!
//! Tier failures the resolver recovers from never reach callers; this log is
//! the only place they show up. Files roll daily under
//! `$XDG_STATE_HOME/postmetrics/` (or `logging.directory`) as
//! `postmetrics.log.YYYY-MM-DD`.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Prefix of every rolled log file.
pub const LOG_FILE_PREFIX: &str = "postmetrics.log";

/// HTTP stack crates whose debug output drowns out resolver decisions.
const QUIET_DEPENDENCIES: &[&str] = &[
    "hyper=warn",
    "hyper_util=warn",
    "reqwest=warn",
    "rustls=warn",
];

/// Install the global subscriber writing to the rolling log file.
///
/// `RUST_LOG` replaces the configured level entirely. Hold the returned guard
/// until exit or buffered lines are lost.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = config.log_dir();
    let (writer, guard) = rolling_writer(&log_dir, config.max_files)?;

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(build_filter(&config.level)?)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

fn rolling_writer(
    log_dir: &Path,
    max_files: usize,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {}", e)))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Filter from `RUST_LOG`, or the configured level with the HTTP stack quieted.
fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    configured_filter(level)
}

fn configured_filter(level: &str) -> Result<EnvFilter> {
    let mut directives = vec![level.trim().to_string()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|d| d.to_string()));
    EnvFilter::try_new(directives.join(","))
        .map_err(|e| Error::Config(format!("invalid logging.level {:?}: {}", level, e)))
}

/// Test subscriber writing through the test harness capture.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the non-blocking writer flushing until dropped.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Path prefix of the log files for `config`; rolled files append a date.
pub fn log_file_path(config: &LoggingConfig) -> PathBuf {
    config.log_dir().join(LOG_FILE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_honours_directory() {
        let config = LoggingConfig {
            directory: Some(PathBuf::from("/tmp/pm-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(
            log_file_path(&config),
            PathBuf::from("/tmp/pm-logs/postmetrics.log")
        );
        assert!(log_file_path(&LoggingConfig::default()).ends_with("postmetrics/postmetrics.log"));
    }

    #[test]
    fn test_configured_filter_quiets_http_stack() {
        let filter = configured_filter("debug").unwrap().to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("reqwest=warn"));
        assert!(filter.contains("hyper=warn"));
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        assert!(matches!(
            configured_filter("loud=[[["),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rolling_writer_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_dir = dir.path().join("nested/logs");

        let (_writer, _guard) = rolling_writer(&log_dir, 0).unwrap();
        assert!(log_dir.is_dir());
    }
}
