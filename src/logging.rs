//! Tracing setup for binaries and tests.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, util::SubscriberInitExt};

static TRACING_INSTALLED: Once = Once::new();

/// Installs a global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call has an effect. If another global subscriber
/// is already set, this one is silently skipped.
pub fn install_tracing() {
    TRACING_INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let console = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("waterui-fiber tracing subscriber failed to initialize");
        }
    });
}
