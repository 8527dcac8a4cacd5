use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing from `RUST_LOG`, writing to stderr so simulation
/// reports on stdout stay machine-readable.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env();
    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(filter);
    let _ = tracing::subscriber::set_global_default(subscriber);
}
