pub mod analysis;
pub mod cdf;
pub mod config;
pub mod correlation;
pub mod error;
pub mod index;
pub mod lookup;
pub mod random;
pub mod records;
pub mod sampler;
pub mod seeds;
pub mod stream;
pub mod synthetic;
pub mod types;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr `fmt` subscriber used by every binary. `RUST_LOG`
/// overrides the default `info` level.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
