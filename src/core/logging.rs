//! Explicit logging setup.
//!
//! Built once at process start and torn down at exit by dropping the
//! returned [`LogGuards`], which flushes the non-blocking file writer and
//! any buffered Sentry events.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::AppConfig;

/// Keep this alive for the lifetime of the process.
pub struct LogGuards {
    _file: WorkerGuard,
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Install the tracing subscriber: rotating file logs (5 generations kept)
/// plus an optional Sentry sink when a DSN is configured.
pub fn init(config: &AppConfig) -> Result<LogGuards> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("roombook")
        .filename_suffix("log")
        .max_log_files(5)
        .build(&config.log_dir)?;
    let (writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    Ok(LogGuards {
        _file: file_guard,
        _sentry: sentry_guard,
    })
}
