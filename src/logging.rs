use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "sheetdeck=info";

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the default
/// filter; calling this twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
