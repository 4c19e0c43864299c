//! Tracing subscriber setup.

use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Maps the number of `-v` flags to the default log level.
pub const fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global tracing subscriber.
///
/// Without an explicit `env_filter`, directives are read from `RUST_LOG` on top of the level
/// given by `verbosity`.
pub fn init_tracing_subscriber(
    verbosity: u8,
    env_filter: Option<impl Into<EnvFilter>>,
) -> Result<(), TryInitError> {
    let filter = match env_filter {
        Some(filter) => filter.into(),
        None => EnvFilter::builder()
            .with_default_directive(verbosity_level(verbosity).into())
            .from_env_lossy(),
    };

    tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).try_init()
}
