//! Tracing setup for the `baily` binary.
//!
//! Diagnostics go to stderr so they never interleave with the dev-server
//! banner and reload notices on stdout. `RUST_LOG` is honored when set;
//! the `-v` flags widen the filter for this crate.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber. Must be called once, before any
/// command runs.
///
/// # Panics
/// Panics when a subscriber is already installed.
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("baily={level}").parse().unwrap())
        .add_directive(level.into());

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
