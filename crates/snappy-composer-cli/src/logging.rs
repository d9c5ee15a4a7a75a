use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_DIR: &str = "./logs";
const LOG_FILE_PREFIX: &str = "snappy-composer.log";
const DEFAULT_LEVEL: &str = "info";

/// Console output plus a daily log file under `COMPOSER_LOG_DIR`.
///
/// Keep the returned guard alive for the whole run; dropping it flushes the
/// file writer.
pub fn init_logger() -> WorkerGuard {
    let level = filter_directive(env::var("TRACING_LEVEL").ok());
    let dir = log_dir(env::var("COMPOSER_LOG_DIR").ok());

    let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_names(true)
        .compact();
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_thread_names(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(EnvFilter::new(level))
        .init();

    info!("Logging to {}", dir.join(LOG_FILE_PREFIX).display());
    guard
}

fn log_dir(configured: Option<String>) -> PathBuf {
    match configured {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => PathBuf::from(DEFAULT_LOG_DIR),
    }
}

fn filter_directive(configured: Option<String>) -> String {
    configured
        .map(|level| level.trim().to_string())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}
