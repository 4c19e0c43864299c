//! Contains the indexer CLI.

use crate::config::IndexerConfig;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::{future::Future, path::PathBuf, sync::Arc};
use tm2_cli::{cli_styles, init_tracing_subscriber, metrics_args::MetricsArgs};
use tm2_indexer_core::Indexer;
use tm2_indexer_rpc::HttpChainClient;
use tm2_indexer_storage::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Tendermint2 block indexer.
///
/// Backfills the chain into a SQLite database, repairs missing heights, then follows new blocks
/// until interrupted.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub(crate) struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'C', default_value = "config.toml", env = "TM2_INDEXER_CONFIG")]
    pub(crate) config: PathBuf,
    /// Verbosity level (0-2).
    #[arg(long = "verbosity", short = 'v', action = ArgAction::Count)]
    pub(crate) v: u8,
    /// Overrides the node JSON-RPC endpoint of the configuration.
    #[arg(long = "rpc.endpoint", env = "TM2_INDEXER_RPC_ENDPOINT")]
    pub(crate) rpc_endpoint: Option<Url>,
    /// Overrides the database path of the configuration.
    #[arg(long = "database.path", env = "TM2_INDEXER_DATABASE_PATH")]
    pub(crate) database_path: Option<PathBuf>,
    /// Stops once gaps are filled and the chain tip is reached.
    #[arg(long = "no-follow")]
    pub(crate) no_follow: bool,
    /// Prometheus CLI arguments.
    #[command(flatten)]
    pub(crate) metrics: MetricsArgs,
}

impl Cli {
    /// Runs the CLI.
    pub(crate) fn run(self) -> Result<()> {
        init_tracing_subscriber(self.v, None::<EnvFilter>)?;

        let config = self.load_config()?;

        Self::run_until_ctrl_c(|cancel| async move {
            self.metrics.init_metrics()?;
            Self::start(config, cancel).await
        })
    }

    /// Loads the configuration file and applies the CLI overrides.
    pub(crate) fn load_config(&self) -> Result<IndexerConfig> {
        let mut config = IndexerConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(endpoint) = &self.rpc_endpoint {
            config.rpc.endpoint = endpoint.clone();
        }
        if let Some(path) = &self.database_path {
            config.database.path = path.clone();
        }
        if self.no_follow {
            config.pipeline.follow = false;
        }
        config.validate().context("invalid command line override")?;
        Ok(config)
    }

    /// Opens the store, connects to the node and runs the indexer until `cancel` fires.
    pub(crate) async fn start(config: IndexerConfig, cancel: CancellationToken) -> Result<()> {
        let store = SqliteStore::open(&config.database.path)
            .with_context(|| format!("opening database {}", config.database.path.display()))?;
        let client = HttpChainClient::new(config.rpc.endpoint.as_str(), config.request_timeout())
            .with_context(|| format!("connecting to {}", config.rpc.endpoint))?;
        info!(
            target: "indexer",
            endpoint = %config.rpc.endpoint,
            database = %config.database.path.display(),
            follow = config.pipeline.follow,
            "Starting tm2 indexer"
        );

        let report = Indexer::new(
            Arc::new(client),
            Arc::new(store),
            config.chain.validators,
            config.pipeline,
            cancel,
        )
        .run()
        .await?;

        info!(
            target: "indexer",
            fetched = report.workers.fetched,
            skipped = report.workers.skipped_total(),
            written = report.writer.blocks_written,
            dropped = report.writer.blocks_dropped,
            "Indexer finished"
        );
        Ok(())
    }

    /// Runs the future built by `f` on a new runtime, cancelling its token on ctrl-c.
    pub(crate) fn run_until_ctrl_c<F, Fut>(f: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime().map_err(|e| anyhow::anyhow!(e))?;
        rt.block_on(async {
            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!(target: "indexer", "Received ctrl-c, shutting down");
                        signal.cancel();
                    }
                    Err(err) => warn!(target: "indexer", %err, "Failed to listen for ctrl-c"),
                }
            });
            f(cancel).await
        })
    }

    /// Creates a new default tokio multi-thread [Runtime](tokio::runtime::Runtime) with all
    /// features enabled
    pub(crate) fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
        [rpc]
        endpoint = "http://127.0.0.1:26657"

        [database]
        path = "indexer.db"

        [chain.validators]
        alice = "g1alice"
    "#;

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["tm2-indexer"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert_eq!(cli.v, 0);
        assert!(!cli.no_follow);
        assert!(!cli.metrics.enabled);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let file = config_file();
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "tm2-indexer",
            "-C",
            path,
            "-vv",
            "--rpc.endpoint",
            "http://10.0.0.1:26657",
            "--database.path",
            ":memory:",
            "--no-follow",
        ])
        .unwrap();
        assert_eq!(cli.v, 2);

        let config = cli.load_config().unwrap();
        assert_eq!(config.rpc.endpoint.as_str(), "http://10.0.0.1:26657/");
        assert_eq!(config.database.path, PathBuf::from(":memory:"));
        assert!(!config.pipeline.follow);
    }

    #[test]
    fn test_config_without_overrides() {
        let file = config_file();
        let cli =
            Cli::try_parse_from(["tm2-indexer", "--config", file.path().to_str().unwrap()]).unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.database.path, PathBuf::from("indexer.db"));
        assert!(config.pipeline.follow);
    }

    #[test]
    fn test_missing_config_fails() {
        let cli = Cli::try_parse_from(["tm2-indexer", "-C", "/nonexistent/config.toml"]).unwrap();
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_database_url_override_is_rejected() {
        let file = config_file();
        let cli = Cli::try_parse_from([
            "tm2-indexer",
            "-C",
            file.path().to_str().unwrap(),
            "--database.path",
            "postgres://indexer@localhost/gno",
        ])
        .unwrap();
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_run_until_ctrl_c_returns_future_result() {
        let result = Cli::run_until_ctrl_c(|cancel| async move {
            assert!(!cancel.is_cancelled());
            Ok(())
        });
        assert!(result.is_ok());
    }
}
