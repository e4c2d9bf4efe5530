//! Subscriber setup for embedding applications and tests.
//!
//! The library itself only emits `tracing` events:
//!
//! | level | event |
//! |-------|-------|
//! | info  | predictor ready, batch scored, batch evaluated |
//! | debug | defaults filled, record failed, package saved/loaded |
//! | warn  | predicted class without a vocabulary entry |
//!
//! Applications that already install a subscriber need nothing from here.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g.
/// `MODELPACK_LOG=modelpack=debug`.
pub const LOG_ENV: &str = "MODELPACK_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "modelpack=info";

/// Filter from [`LOG_ENV`], falling back to `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a global fmt subscriber writing to stderr.
///
/// Fails if a global subscriber is already set.
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

/// Like [`try_init`], ignoring an already installed subscriber.
pub fn init() {
    let _ = try_init();
}

/// Subscriber for tests: output captured by the test harness.
pub fn init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("modelpack=debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
