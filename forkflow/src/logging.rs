//! Tracing setup for the CLI.
//!
//! Step transitions are logged at `info`, adapter details at `debug`.
//! Output goes to stderr so stdout carries only the final summary.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `forkflow=info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=forkflow=debug forkflow ssh alice acme/widgets fix-typo
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forkflow=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
