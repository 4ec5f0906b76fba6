//! Diagnostics: an append-only error log for failed pages plus console
//! progress on stderr.

use crate::ocr::OCR_FAILURE_TARGET;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Error log, relative to the working directory.
pub const ERROR_LOG_FILE: &str = "ocr_errors.log";

/// Install the global subscriber. Keep the returned guard alive until exit;
/// dropping it flushes the error log.
pub fn init(log_file: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = error_log_writer(log_file)?;
    subscriber(writer)
        .try_init()
        .context("Failed to install logger")?;
    Ok(guard)
}

/// Open `log_file` for appending behind a single writer thread, so lines
/// from concurrent OCR workers are written whole.
fn error_log_writer(log_file: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = log_file
        .file_name()
        .context("Log file path has no file name")?
        .to_string_lossy()
        .to_string();
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;

    Ok(NonBlockingBuilder::default().lossy(false).finish(appender))
}

fn subscriber(error_log: NonBlocking) -> impl Subscriber + Send + Sync {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Page failures only go to the error log.
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter)
        .with_filter(filter_fn(|meta| meta.target() != OCR_FAILURE_TARGET));

    let file_layer = fmt::layer()
        .with_writer(error_log)
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
}
