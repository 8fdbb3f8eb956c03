//! Shared test helpers.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes tracing output for tests. Safe to call from every test; only
/// the first call installs the subscriber.
///
/// Set `RUST_LOG` to adjust verbosity, e.g. `RUST_LOG=riptide=trace`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
