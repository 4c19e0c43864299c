use crate::{Height, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A block as stored by the indexer.
///
/// Hashes are kept in their external (base64) encoding. The `signatures` list holds exactly one
/// entry per validator known to the registry at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block height, unique across the store.
    pub height: Height,
    /// The block time.
    pub time: DateTime<Utc>,
    /// The block id hash.
    pub hash: String,
    /// Number of transactions in this block.
    pub num_txs: i64,
    /// Number of transactions in the chain up to and including this block.
    pub total_txs: i64,
    /// The application version reported in the header.
    pub app_version: String,
    /// Hash of the transactions.
    pub data_hash: String,
    /// Hash of the previous block's commit.
    pub last_commit_hash: String,
    /// Hash of the current validator set.
    pub validators_hash: String,
    /// Hash of the validator set for the next block.
    pub next_validators_hash: String,
    /// Hash of the consensus parameters.
    pub consensus_hash: String,
    /// Application state hash after the previous block.
    pub app_hash: String,
    /// Hash of the previous block's results.
    pub last_results_hash: String,
    /// Bech32 address of the block proposer.
    pub proposer_address: String,
    /// Transactions in source order.
    pub transactions: Vec<Transaction>,
    /// One signature status per known validator.
    pub signatures: Vec<BlockSignature>,
}

impl Block {
    /// Returns the number of validators that signed this block.
    pub fn signed_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.signed).count()
    }

    /// Returns the total number of messages across all transactions.
    pub fn message_count(&self) -> usize {
        self.transactions.iter().map(|tx| tx.messages.len()).sum()
    }
}

/// Whether a known validator signed a given block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSignature {
    /// Height of the owning block.
    pub block_height: Height,
    /// Bech32 address of the validator.
    pub validator_addr: String,
    /// `true` if the validator's precommit is present in the block's last commit.
    pub signed: bool,
}
