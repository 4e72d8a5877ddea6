//! Tracing setup: JSON lines to a daily rolling file, compact text to stderr.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// default filter.
///
/// The returned [`WorkerGuard`] flushes the file writer on drop and must
/// live as long as the process.
pub fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.log_dir)
        .with_context(|| format!("failed to create log dir {}", logging.log_dir))?;

    let (file_writer, guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::daily(&logging.log_dir, &logging.file_prefix),
    );

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.default_filter)
            .with_context(|| format!("invalid log filter '{}'", logging.default_filter))?,
    };

    let file_layer = fmt::layer()
        .json()
        .with_current_span(false)
        .with_ansi(false)
        .with_writer(file_writer);
    let stderr_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}
