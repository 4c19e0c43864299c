use thiserror::Error;
use tm2_indexer_types::Height;

/// Reasons for which a raw block cannot be turned into a [`Block`](tm2_indexer_types::Block).
///
/// None of them is fatal: the height is skipped and picked up again by a later gap scan.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The proposer is not part of the validator registry.
    #[error("block {height}: proposer {proposer} is not a known validator")]
    UnknownProposer {
        /// Height of the rejected block.
        height: Height,
        /// Address of the proposer.
        proposer: String,
    },

    /// The commit does not carry one precommit slot per known validator.
    #[error("block {height}: {precommits} precommit slots for {validators} known validators")]
    QuorumMismatch {
        /// Height of the rejected block.
        height: Height,
        /// Number of precommit slots, absent votes included.
        precommits: usize,
        /// Size of the validator registry.
        validators: usize,
    },

    /// A precommit was cast by a validator that is not part of the registry.
    #[error("block {height}: precommit from unknown validator {signer}")]
    UnknownSigner {
        /// Height of the rejected block.
        height: Height,
        /// Address of the signer.
        signer: String,
    },

    /// The same validator appears in more than one precommit slot.
    #[error("block {height}: validator {signer} signed more than one precommit slot")]
    DuplicateSigner {
        /// Height of the rejected block.
        height: Height,
        /// Address of the repeated signer.
        signer: String,
    },

    /// A transaction could not be decoded.
    #[error("block {height}: malformed transaction at index {index}")]
    MalformedTransaction {
        /// Height of the rejected block.
        height: Height,
        /// Position of the transaction in the block.
        index: usize,
        /// The decoding failure.
        #[source]
        source: TxDecodeError,
    },
}

/// Why a transaction could not be decoded.
#[derive(Debug, Error)]
pub enum TxDecodeError {
    /// The bytes are not a valid `std.Tx` encoding.
    #[error(transparent)]
    Wire(#[from] prost::DecodeError),
    /// The fee is not a coin string.
    #[error("invalid gas fee {0:?}")]
    GasFee(String),
}

impl TransformError {
    /// Returns the height of the rejected block.
    pub const fn height(&self) -> Height {
        match self {
            Self::UnknownProposer { height, .. } |
            Self::QuorumMismatch { height, .. } |
            Self::UnknownSigner { height, .. } |
            Self::DuplicateSigner { height, .. } |
            Self::MalformedTransaction { height, .. } => *height,
        }
    }
}
