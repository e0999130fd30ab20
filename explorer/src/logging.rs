//! Diagnostic tracing for the explorer.
//!
//! - **Tracing (this module)**: operator diagnostics via `RUST_LOG`, written to
//!   stderr.
//! - **Session logs (`io/round_log`)**: prompts, replies and per-round records
//!   under the session's `logs/` directory. Always written, unaffected by
//!   `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`; defaults to `info` for this crate and `warn` elsewhere.
///
/// # Example
/// ```bash
/// RUST_LOG=explorer=debug explorer run --app-name Clock ...
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,explorer=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
