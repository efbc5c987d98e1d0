//! Support for tracing execution of a program.

use tracing_subscriber::{fmt::Subscriber, prelude::*, EnvFilter};

/// Set up the `tracing` library with reasonable options.
///
/// Logs go to standard error, because the runner reads workflow commands from
/// standard output. `RUST_LOG` overrides the default `info` level. The runner
/// timestamps every line itself, so we don't.
pub fn initialize_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .finish()
        .init();
}
