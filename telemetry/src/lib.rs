//! Tracing setup shared by binaries and tests that use `easybq`.
//!
//! Records are written as single lines carrying a timestamp, the level and the message.
//! Writing happens on a background worker so logging never blocks the caller.

use std::sync::Once;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Guard that flushes buffered log records when dropped.
///
/// Keep it alive for as long as the process logs; dropping it early loses records.
pub type LogFlusher = WorkerGuard;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global subscriber writing to stdout.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let (writer, log_flusher) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(build_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false),
        )
        .try_init()?;

    info!(app_name, "tracing initialized");

    Ok(log_flusher)
}

/// Installs a subscriber that writes through the test harness, at most once per process.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(build_filter())
            .with_test_writer()
            .try_init();
    });
}

fn build_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
