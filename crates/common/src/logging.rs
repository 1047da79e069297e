//! Logging bootstrap.
//!
//! Library code only emits `tracing` events; binaries and tests decide whether
//! to install a subscriber.

#[cfg(feature = "logging")]
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to `info`.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt().with_env_filter(filter).with_target(true).with_thread_ids(true).try_init();
}

/// Verbose subscriber that writes through the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt().with_env_filter(EnvFilter::new("debug")).with_test_writer().try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
