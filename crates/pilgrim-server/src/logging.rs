//! Logging initialization.
//!
//! - **Production** (`PILGRIM_ENV=production`): JSON logs to daily rolling
//!   files plus compact logs to stdout
//! - **Development**: pretty logs to stdout with span events

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the default filter directive.
pub const LOG_LEVEL_ENV: &str = "PILGRIM_LOG_LEVEL";

/// Environment variable selecting the logging profile.
pub const ENVIRONMENT_ENV: &str = "PILGRIM_ENV";

// Writers flush on drop; the guards must outlive every log call.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Whether `PILGRIM_ENV` selects the production profile.
#[must_use]
pub fn is_production() -> bool {
    std::env::var(ENVIRONMENT_ENV).is_ok_and(|value| value.eq_ignore_ascii_case("production"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `PILGRIM_LOG_LEVEL` (default
/// `info`) is used as the filter.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed, or in
/// production if the log directory cannot be created.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    if is_production {
        init_production(env_filter)?;
    } else {
        init_development(env_filter);
    }

    Ok(())
}

fn init_production(env_filter: EnvFilter) -> anyhow::Result<()> {
    let file_appender = file_appender(&log_directory())?;
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
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
    Ok(())
}

/// Daily rolling appender under `log_dir`, creating the directory if needed.
fn file_appender(log_dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pilgrim")
        .build(log_dir)
        .with_context(|| format!("opening log file in {}", log_dir.display()))?;
    Ok(appender)
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// Log directory for the current platform.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/pilgrim")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "pilgrim")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
