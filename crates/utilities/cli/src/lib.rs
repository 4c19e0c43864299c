//! Utilities shared by the tm2 indexer binaries: tracing and metrics initialization, and the
//! common CLI flags and styles.

mod error;
pub use error::{CliError, CliResult, PrometheusError};

mod log;
pub use log::{init_tracing_subscriber, verbosity_level};

pub mod metrics_args;

mod prometheus;
pub use prometheus::init_prometheus_server;

mod styles;
pub use styles::cli_styles;
