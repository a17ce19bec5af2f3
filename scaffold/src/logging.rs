//! Diagnostic tracing to stderr.
//!
//! Tracing is for debugging the agent itself. The run report printed to stdout and
//! the optional `--log-dir` transcript are the product output and do not depend on
//! `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. `verbose` adds `scaffold=info` on top so
/// phase progress is visible without configuring the environment.
///
/// # Example
/// ```bash
/// RUST_LOG=scaffold=debug scaffold "print hello" /tmp/p1
/// ```
pub fn init(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose && let Ok(directive) = "scaffold=info".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
