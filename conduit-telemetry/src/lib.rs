//! Tracing initialization for conduit binaries and tests.

use std::io::Error;
use std::path::PathBuf;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};

use conduit_config::Environment;
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// Environment variable overriding the directory of the rolling log files.
const LOG_DIR_ENV_NAME: &str = "LOG_DIR";

/// Default directory of the rolling log files.
const DEFAULT_LOG_DIR: &str = "logs";

/// Number of daily log files kept on disk.
const MAX_LOG_FILES: usize = 5;

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Keeps the background log writer alive.
///
/// Dropping a [`LogFlusher::Flusher`] flushes the buffered log lines to disk, so
/// it must be held until the process exits.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Call this function once at the beginning of a test and then set the ENABLE_TRACING
/// environment variable to 1 to view tracing in the terminal:
///
/// ENABLE_TRACING=1 cargo test <test_name>
///
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an explicit environment the prod file writer would be used.
            Environment::Dev.set();
            if let Ok(flusher) = init_tracing("test") {
                // Test processes never flush on exit, the console writer is unbuffered.
                std::mem::forget(flusher);
            }
        }
    });
}

/// Initializes tracing for the application.
///
/// In production-like environments events are written as JSON to a daily rolling
/// file named after `app_name`. In development they are pretty printed to the
/// terminal. `RUST_LOG` controls the level and defaults to `info`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    // Route records of libraries using the `log` crate into `tracing`.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, app_name)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

fn log_dir() -> PathBuf {
    std::env::var(LOG_DIR_ENV_NAME)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR))
}

fn configure_prod_tracing(filter: EnvFilter, app_name: &str) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir())?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(file_appender)
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        // File and line number add noise to the terminal output.
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Replaces the panic hook with one that reports the panic through `tracing`
/// before running the previous hook, so panics reach the log files.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_defaults_to_logs() {
        if std::env::var(LOG_DIR_ENV_NAME).is_err() {
            assert_eq!(log_dir(), PathBuf::from(DEFAULT_LOG_DIR));
        }
    }
}
