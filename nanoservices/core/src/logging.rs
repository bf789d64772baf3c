use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Reads `RUST_LOG` from the environment (default level is `info`). Safe to
/// call more than once: later calls are ignored.
pub fn init() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    init_with_filter(&filter);
}

/// Same as [`init`] with an explicit filter directive such as
/// `"medallion_core=debug"`.
pub fn init_with_filter(directives: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(false)
        .try_init();
}
