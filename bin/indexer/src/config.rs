//! The TOML configuration file.

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tm2_indexer_core::{InvalidPipelineConfig, PipelineConfig};
use url::Url;

/// Configuration of the indexer.
///
/// ```toml
/// [rpc]
/// endpoint = "http://127.0.0.1:26657"
///
/// [database]
/// path = "indexer.db"
///
/// [chain.validators]
/// alice = "g1..."
///
/// [pipeline]
/// batch_write = 100
/// workers = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IndexerConfig {
    /// Chain node.
    pub(crate) rpc: RpcConfig,
    /// Store.
    pub(crate) database: DatabaseConfig,
    /// Chain parameters.
    pub(crate) chain: ChainConfig,
    /// Pipeline tuning.
    #[serde(default, alias = "scrapper")]
    pub(crate) pipeline: PipelineConfig,
}

/// The `[rpc]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RpcConfig {
    /// JSON-RPC endpoint of the node.
    pub(crate) endpoint: Url,
    /// Per-call timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
}

/// The `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DatabaseConfig {
    /// SQLite database file, `:memory:` for a transient database.
    #[serde(alias = "endpoint")]
    pub(crate) path: PathBuf,
}

/// The `[chain]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ChainConfig {
    /// Validator name to address.
    #[serde(default)]
    pub(crate) validators: BTreeMap<String, String>,
}

impl DatabaseConfig {
    /// Returns the scheme when the path parses as a URL. Single letter schemes are drive letters.
    fn url_scheme(&self) -> Option<String> {
        let url = Url::parse(self.path.to_str()?).ok()?;
        (url.scheme().len() > 1).then(|| url.scheme().to_string())
    }
}

const fn default_timeout_secs() -> u64 {
    10
}

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The configuration path.
        path: PathBuf,
        /// The read failure.
        #[source]
        source: io::Error,
    },
    /// The file is not a valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A pipeline value is out of range.
    #[error(transparent)]
    Pipeline(#[from] InvalidPipelineConfig),
    /// No validator is configured.
    #[error("chain.validators must name at least one validator")]
    NoValidators,
    /// The database path is a URL, e.g. a PostgreSQL DSN from an older configuration.
    #[error("database.path {path} is a {scheme} URL, expected a SQLite file path")]
    DatabaseUrl {
        /// The configured path.
        path: String,
        /// The URL scheme found.
        scheme: String,
    },
    /// The RPC timeout is zero.
    #[error("rpc.timeout_secs must be at least 1")]
    ZeroTimeout,
}

impl IndexerConfig {
    /// Reads and validates the configuration at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        raw.parse()
    }

    /// Checks the values the pipeline cannot work with.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.validators.is_empty() {
            return Err(ConfigError::NoValidators);
        }
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(scheme) = self.database.url_scheme() {
            return Err(ConfigError::DatabaseUrl {
                path: self.database.path.display().to_string(),
                scheme,
            });
        }
        self.pipeline.validate()?;
        Ok(())
    }

    /// Returns the per-call RPC timeout.
    pub(crate) const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }
}

impl std::str::FromStr for IndexerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    const FULL: &str = r#"
        [rpc]
        endpoint = "http://127.0.0.1:26657"
        timeout_secs = 3

        [database]
        path = "/var/lib/indexer.db"

        [chain.validators]
        alice = "g1alice"
        bob = "g1bob"

        [pipeline]
        batch_write = 50
        workers = 4
        height_queue = 200
        block_queue = 100
        low_water_mark = 5
        follow = false
    "#;

    #[test]
    fn test_parse_full() {
        let config: IndexerConfig = FULL.parse().unwrap();

        assert_eq!(config.rpc.endpoint.as_str(), "http://127.0.0.1:26657/");
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.database.path, PathBuf::from("/var/lib/indexer.db"));
        assert_eq!(config.chain.validators.get("bob").map(String::as_str), Some("g1bob"));
        assert_eq!(
            config.pipeline,
            PipelineConfig {
                batch_write: 50,
                workers: 4,
                height_queue: 200,
                block_queue: 100,
                low_water_mark: 5,
                follow: false,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_parse_legacy_layout() {
        let config: IndexerConfig = r#"
            [rpc]
            endpoint = "http://node:26657"

            [database]
            endpoint = "legacy.db"

            [chain]
            validators = { alice = "g1alice" }

            [scrapper]
            batch_write = 10
            goro_block_parser = 2
            buffer_chan_blocks = 30
            buffer_chan_heights = 40
        "#
        .parse()
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.database.path, PathBuf::from("legacy.db"));
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.block_queue, 30);
        assert_eq!(config.pipeline.height_queue, 40);
        assert_eq!(config.pipeline.low_water_mark, 10);
    }

    #[rstest]
    #[case::no_validators("[chain]\n", "chain.validators")]
    #[case::zero_workers("[chain.validators]\na = \"g1a\"\n[pipeline]\nworkers = 0\n", "pipeline.workers")]
    #[case::zero_batch("[chain.validators]\na = \"g1a\"\n[pipeline]\nbatch_write = 0\n", "pipeline.batch_write")]
    fn test_invalid_values(#[case] tail: &str, #[case] expected: &str) {
        let raw = format!("[rpc]\nendpoint = \"http://n:1\"\n[database]\npath = \"x.db\"\n{tail}");
        let err = raw.parse::<IndexerConfig>().unwrap_err();
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[rstest]
    #[case::postgres_dsn("postgres://indexer:secret@db:5432/gno")]
    #[case::postgresql_dsn("postgresql://localhost/gno")]
    #[case::sqlite_uri("sqlite:///var/lib/indexer.db")]
    fn test_database_url_is_rejected(#[case] path: &str) {
        let raw = format!(
            "[rpc]\nendpoint = \"http://n:1\"\n[database]\nendpoint = \"{path}\"\n[chain.validators]\na = \"g1a\"\n"
        );
        let err = raw.parse::<IndexerConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::DatabaseUrl { .. }), "{err}");
    }

    #[rstest]
    #[case::relative("indexer.db")]
    #[case::absolute("/var/lib/indexer.db")]
    #[case::memory(":memory:")]
    #[case::drive_letter("C:/indexer/indexer.db")]
    fn test_database_file_paths_are_accepted(#[case] path: &str) {
        let config = DatabaseConfig { path: PathBuf::from(path) };
        assert_eq!(config.url_scheme(), None);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let raw = format!("{FULL}\n[extra]\nkey = 1\n");
        assert!(matches!(raw.parse::<IndexerConfig>(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = IndexerConfig::load(file.path()).unwrap();
        assert_eq!(config.pipeline.batch_write, 50);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IndexerConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
