//! Logging bootstrap
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! embedder's call. [`init`] is a convenience for binaries and tests that
//! want the usual `fmt` output filtered by `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes. Safe to call from every test.
pub fn init() -> bool {
    init_with_default("info")
}

/// Like [`init`], with `default_directive` used when `RUST_LOG` is unset
pub fn init_with_default(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_test_writer()
        .try_init()
        .is_ok()
}
