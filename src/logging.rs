//! Log subscriber setup for the `locator` binary.
//!
//! Logs go to stderr so JSON output on stdout stays clean. `RUST_LOG`
//! takes precedence over the verbosity flag.

use std::io;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Map `-v` occurrences onto a default filter directive.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "locator=debug,info",
        _ => "trace",
    }
}

pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let initialized = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .try_init();

    if initialized.is_ok() {
        tracing::debug!(verbosity, "logging initialized");
    }
}
