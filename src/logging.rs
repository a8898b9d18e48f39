//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Directive applied when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "warn" };
    format!("hubdesk_lib={},hubdesk_cli={}", level, level)
}

/// Install the global subscriber, logging to stderr.
///
/// `RUST_LOG` takes precedence over `verbose`. Calling this twice is harmless.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
