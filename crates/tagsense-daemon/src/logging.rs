//! Logging initialization and configuration.
//!
//! This module provides environment-aware logging setup:
//! - **Production**: JSON logs to daily files + compact logs to stdout
//! - **Development**: Pretty logs to stdout
//!
//! Per-cycle reader logs (`tagsense_core::session`) get their own level from
//! `logging.cycle_level`, so a busy reader array can be quieted without
//! losing registry and daemon messages.

use std::path::PathBuf;
use std::sync::OnceLock;

use tagsense_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the default log filter.
pub const LOG_LEVEL_ENV: &str = "TAGSENSE_LOG_LEVEL";

/// Target of the per-cycle reader session logs.
pub const SESSION_TARGET: &str = "tagsense_core::session";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the logging system.
///
/// `RUST_LOG` replaces the whole filter when set. Otherwise the filter is
/// `TAGSENSE_LOG_LEVEL` (default `info`) with the session target set to
/// `config.cycle_level`.
///
/// In production, daily files named `<file_prefix>.<date>` are written to
/// `config.directory` (or the platform default) and a compact copy goes to
/// stdout for the journal.
///
/// # Errors
///
/// Returns an error if the filter cannot be parsed.
pub fn init(is_production: bool, config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let base = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(filter_directives(&base, config))?
        }
    };

    if is_production {
        init_production(env_filter, config);
    } else {
        init_development(env_filter);
    }

    Ok(())
}

/// Filter string for `base` with the session target overridden.
#[must_use]
pub fn filter_directives(base: &str, config: &LoggingConfig) -> String {
    format!("{base},{SESSION_TARGET}={}", config.cycle_level)
}

fn init_production(env_filter: EnvFilter, config: &LoggingConfig) {
    let log_dir = log_directory(config);

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir).ok();
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, &config.file_prefix);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // No ANSI colors for journald
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
}

fn init_development(env_filter: EnvFilter) {
    // Span events are left off: poll_all opens a span every tick.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// Directory for production log files.
fn log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.directory {
        return dir.clone();
    }

    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/tagsense")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "tagsense")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_directory_is_valid_path() {
        let dir = log_directory(&LoggingConfig::default());
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_configured_log_directory_wins() {
        let config = LoggingConfig {
            directory: Some(PathBuf::from("/srv/door/logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(log_directory(&config), PathBuf::from("/srv/door/logs"));
    }

    #[test]
    fn test_cycle_level_targets_sessions() {
        let config = LoggingConfig {
            cycle_level: "warn".into(),
            ..LoggingConfig::default()
        };
        let directives = filter_directives("debug", &config);
        assert_eq!(directives, "debug,tagsense_core::session=warn");
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_default_filter_parses() {
        let directives = filter_directives("info", &LoggingConfig::default());
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
