use crate::{TransformError, ValidatorRegistry, transform_block};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tm2_indexer_rpc::{ChainClient, ChainClientError};
use tm2_indexer_types::{Block, Height};

/// Fetches a block from the node and turns it into its indexable form.
#[derive(Debug)]
pub struct BlockFetcher<C> {
    client: Arc<C>,
    registry: Arc<ValidatorRegistry>,
}

impl<C> Clone for BlockFetcher<C> {
    fn clone(&self) -> Self {
        Self { client: Arc::clone(&self.client), registry: Arc::clone(&self.registry) }
    }
}

impl<C: ChainClient> BlockFetcher<C> {
    /// Creates a fetcher reading from `client` and checking blocks against `registry`.
    pub const fn new(client: Arc<C>, registry: Arc<ValidatorRegistry>) -> Self {
        Self { client, registry }
    }

    /// Fetches and transforms the block at `height`.
    pub async fn fetch(&self, height: Height) -> Result<Block, FetchError> {
        let raw = self
            .client
            .block_at(height)
            .await
            .map_err(|source| FetchError::Rpc { height, source })?;
        Ok(transform_block(&raw, &self.registry)?)
    }
}

/// Failure to produce a block for a height. The height is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The node call failed.
    #[error("failed to fetch block {height}: {source}")]
    Rpc {
        /// The requested height.
        height: Height,
        /// The client failure.
        #[source]
        source: ChainClientError,
    },

    /// The block was fetched but rejected.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl FetchError {
    /// Returns the height that could not be produced.
    pub const fn height(&self) -> Height {
        match self {
            Self::Rpc { height, .. } => *height,
            Self::Transform(err) => err.height(),
        }
    }

    /// Classifies the failure.
    pub const fn reason(&self) -> SkipReason {
        match self {
            Self::Rpc { .. } => SkipReason::Rpc,
            Self::Transform(TransformError::UnknownProposer { .. }) => SkipReason::UnknownProposer,
            Self::Transform(TransformError::QuorumMismatch { .. }) => SkipReason::QuorumMismatch,
            Self::Transform(TransformError::UnknownSigner { .. }) => SkipReason::UnknownSigner,
            Self::Transform(TransformError::DuplicateSigner { .. }) => SkipReason::DuplicateSigner,
            Self::Transform(TransformError::MalformedTransaction { .. }) => {
                SkipReason::MalformedTransaction
            }
        }
    }
}

/// Why a height was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// The node call failed.
    Rpc,
    /// The proposer is unknown.
    UnknownProposer,
    /// The precommit count does not match the registry.
    QuorumMismatch,
    /// A precommit comes from an unknown validator.
    UnknownSigner,
    /// A validator signed more than one precommit slot.
    DuplicateSigner,
    /// A transaction could not be decoded.
    MalformedTransaction,
}

impl SkipReason {
    /// Every reason, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Rpc,
        Self::UnknownProposer,
        Self::QuorumMismatch,
        Self::UnknownSigner,
        Self::DuplicateSigner,
        Self::MalformedTransaction,
    ];

    /// Returns the metric label of the reason.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::UnknownProposer => "unknown_proposer",
            Self::QuorumMismatch => "quorum_mismatch",
            Self::UnknownSigner => "unknown_signer",
            Self::DuplicateSigner => "duplicate_signer",
            Self::MalformedTransaction => "malformed_transaction",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
