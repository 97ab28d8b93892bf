use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber for a binary.
///
/// `RUST_LOG` overrides the default `info` filter, e.g.
/// `RUST_LOG=supply_chain_analytics::solver=debug`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Verbose subscriber routed through the test harness; safe to call repeatedly
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
