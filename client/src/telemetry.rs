//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events and `metrics` counters; installing
//! a subscriber or a metrics exporter is left to the binary embedding it.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ridesync=info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(fmt::layer().with_target(false))
        .try_init()
}

/// Subscriber for the current thread that writes through the test harness.
///
/// Keep the guard alive for the duration of the test.
#[must_use]
pub fn test_subscriber() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer());
    tracing::subscriber::set_default(subscriber)
}
