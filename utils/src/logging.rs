//! Zero-configuration `tracing` bootstrap for tests and tools.

/// Install a compact subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once: later calls are no-ops, so every test can
/// call it without coordinating.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}
