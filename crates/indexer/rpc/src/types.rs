//! Blocks and validators as served by a Tendermint2 node.

use crate::serde_helpers::{base64_bytes, base64_list, quoted_i64};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tm2_indexer_types::Height;

/// A block as returned by the node, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// The block id hash.
    pub hash: Vec<u8>,
    /// The block header.
    pub header: RawHeader,
    /// Raw, still encoded, transactions in block order.
    pub txs: Vec<Vec<u8>>,
    /// Precommit slots of the previous block's commit. `None` marks an absent vote.
    pub precommits: Vec<Option<RawPrecommit>>,
}

/// Header fields of a [`RawBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawHeader {
    /// The block height.
    #[serde(with = "quoted_i64")]
    pub height: Height,
    /// The block time.
    pub time: DateTime<Utc>,
    /// Number of transactions in the block.
    #[serde(with = "quoted_i64")]
    pub num_txs: i64,
    /// Number of transactions in the chain so far.
    #[serde(with = "quoted_i64")]
    pub total_txs: i64,
    /// Application version.
    #[serde(default)]
    pub app_version: String,
    /// Hash of the transactions.
    #[serde(default, with = "base64_bytes")]
    pub data_hash: Vec<u8>,
    /// Hash of the previous block's commit.
    #[serde(default, with = "base64_bytes")]
    pub last_commit_hash: Vec<u8>,
    /// Hash of the current validator set.
    #[serde(default, with = "base64_bytes")]
    pub validators_hash: Vec<u8>,
    /// Hash of the next validator set.
    #[serde(default, with = "base64_bytes")]
    pub next_validators_hash: Vec<u8>,
    /// Hash of the consensus parameters.
    #[serde(default, with = "base64_bytes")]
    pub consensus_hash: Vec<u8>,
    /// Application state hash.
    #[serde(default, with = "base64_bytes")]
    pub app_hash: Vec<u8>,
    /// Hash of the previous block's results.
    #[serde(default, with = "base64_bytes")]
    pub last_results_hash: Vec<u8>,
    /// Bech32 address of the proposer.
    pub proposer_address: String,
}

/// A precommit vote included in a block's last commit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawPrecommit {
    /// Bech32 address of the voting validator.
    pub validator_address: String,
    /// Index of the validator in the validator set.
    #[serde(default, with = "quoted_i64")]
    pub validator_index: i64,
}

/// A member of the validator set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidatorInfo {
    /// Bech32 address of the validator.
    pub address: String,
    /// The validator public key, in amino JSON form.
    #[serde(default)]
    pub pub_key: Option<serde_json::Value>,
    /// Voting power of the validator.
    #[serde(default, with = "quoted_i64")]
    pub voting_power: i64,
}

/// Result of the `status` method.
#[derive(Debug, Deserialize)]
pub(crate) struct ResultStatus {
    pub(crate) sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncInfo {
    #[serde(with = "quoted_i64")]
    pub(crate) latest_block_height: Height,
}

/// Result of the `block` method.
#[derive(Debug, Deserialize)]
pub(crate) struct ResultBlock {
    block_meta: BlockMeta,
    block: WireBlock,
}

#[derive(Debug, Deserialize)]
struct BlockMeta {
    block_id: BlockId,
}

#[derive(Debug, Deserialize)]
struct BlockId {
    #[serde(default, with = "base64_bytes")]
    hash: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    header: RawHeader,
    #[serde(default)]
    data: WireData,
    #[serde(default)]
    last_commit: Option<WireCommit>,
}

#[derive(Debug, Default, Deserialize)]
struct WireData {
    #[serde(default, with = "base64_list")]
    txs: Vec<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    #[serde(default)]
    precommits: Option<Vec<Option<RawPrecommit>>>,
}

impl From<ResultBlock> for RawBlock {
    fn from(result: ResultBlock) -> Self {
        let WireBlock { header, data, last_commit } = result.block;
        Self {
            hash: result.block_meta.block_id.hash,
            header,
            txs: data.txs,
            precommits: last_commit.and_then(|c| c.precommits).unwrap_or_default(),
        }
    }
}

/// Result of the `validators` method.
#[derive(Debug, Deserialize)]
pub(crate) struct ResultValidators {
    #[serde(default)]
    pub(crate) validators: Vec<ValidatorInfo>,
}
