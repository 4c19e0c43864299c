use crate::{ChainClientError, RawBlock, ValidatorInfo};
use async_trait::async_trait;
use std::fmt::Debug;
use tm2_indexer_types::Height;

/// Read access to a chain node.
///
/// Implementations are shared by every worker of the pipeline and must be safe to call
/// concurrently. Each call is expected to be bounded in time; an implementation that can hang
/// forever stalls the worker that issued the call.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Returns the height of the latest block known to the node.
    async fn latest_height(&self) -> Result<Height, ChainClientError>;

    /// Returns the block at the given height.
    async fn block_at(&self, height: Height) -> Result<RawBlock, ChainClientError>;

    /// Returns the validator set active at the given height.
    async fn validator_set_at(&self, height: Height)
    -> Result<Vec<ValidatorInfo>, ChainClientError>;
}
