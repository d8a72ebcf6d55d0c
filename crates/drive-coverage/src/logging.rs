//! Logging (and optional profiling) setup for the binary
//!
//! Log lines go to stderr so stdout only carries the run summary. `RUST_LOG`
//! takes precedence over the level chosen with `-v`/`-q`. With the `profiling`
//! feature, setting `ENABLE_PROFILING` also records a Chrome trace of the run
//! (`trace-*.json` in the working directory), flushed when the guard is dropped.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the trace file open until the end of `main`
#[must_use]
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _chrome: Option<tracing_chrome::FlushGuard>,
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

#[cfg(feature = "profiling")]
pub fn setup_logging(default_level: &str) -> LoggingGuard {
    let (chrome_layer, guard) = if std::env::var("ENABLE_PROFILING").is_ok() {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter(default_level));

    tracing_subscriber::registry()
        .with(chrome_layer)
        .with(fmt_layer)
        .init();

    if guard.is_some() {
        tracing::info!("ENABLE_PROFILING set - recording a Chrome trace of this run");
    }
    LoggingGuard { _chrome: guard }
}

#[cfg(not(feature = "profiling"))]
pub fn setup_logging(default_level: &str) -> LoggingGuard {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter(default_level));

    tracing_subscriber::registry().with(fmt_layer).init();
    LoggingGuard {}
}
