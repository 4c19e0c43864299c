//! Prometheus metrics CLI flags.

use crate::{CliResult, init_prometheus_server};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};

/// Configuration of the Prometheus exporter.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct MetricsArgs {
    /// Serve Prometheus metrics.
    #[arg(long = "metrics.enabled", env = "TM2_METRICS_ENABLED", default_value_t = false)]
    pub enabled: bool,
    /// Address the metrics server listens on.
    #[arg(long = "metrics.addr", env = "TM2_METRICS_ADDR", default_value = "0.0.0.0")]
    pub addr: IpAddr,
    /// Port the metrics server listens on.
    #[arg(long = "metrics.port", env = "TM2_METRICS_PORT", default_value_t = 9090)]
    pub port: u16,
}

impl Default for MetricsArgs {
    fn default() -> Self {
        Self { enabled: false, addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 9090 }
    }
}

impl MetricsArgs {
    /// Starts the Prometheus server if metrics are enabled.
    pub fn init_metrics(&self) -> CliResult<()> {
        if self.enabled {
            init_prometheus_server(self.addr, self.port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        metrics: MetricsArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["indexer"]).unwrap();
        assert_eq!(cli.metrics, MetricsArgs::default());
    }

    #[test]
    fn test_flags() {
        let cli = TestCli::try_parse_from([
            "indexer",
            "--metrics.enabled",
            "--metrics.addr",
            "127.0.0.1",
            "--metrics.port",
            "9300",
        ])
        .unwrap();
        assert!(cli.metrics.enabled);
        assert_eq!(cli.metrics.addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(cli.metrics.port, 9300);
    }

    #[test]
    fn test_disabled_metrics_do_nothing() {
        assert!(MetricsArgs::default().init_metrics().is_ok());
    }
}
