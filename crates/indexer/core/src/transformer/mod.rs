//! Turns raw node blocks into indexable [`Block`]s.
//!
//! The transformation is pure: it only depends on the raw block and the [`ValidatorRegistry`].
//! Blocks that disagree with the registry are rejected rather than partially indexed.

use crate::ValidatorRegistry;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use prost::Message as _;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tm2_indexer_rpc::RawBlock;
use tm2_indexer_types::{Block, BlockSignature, Height, Message, MessagePayload, Transaction};

pub(crate) mod amino;
use amino::{StdTx, parse_coin, route_and_type};

mod error;
pub use error::{TransformError, TxDecodeError};

/// Builds the indexable form of `raw`, checked against `registry`.
///
/// The checks run in order: proposer membership, precommit slot count, signer membership and
/// uniqueness, then transaction decoding. The first failing check rejects the block. The first block of a chain
/// carries no commit and is accepted with every validator marked as not signed.
pub fn transform_block(raw: &RawBlock, registry: &ValidatorRegistry) -> Result<Block, TransformError> {
    let header = &raw.header;
    let height = header.height;

    if !registry.contains(&header.proposer_address) {
        return Err(TransformError::UnknownProposer {
            height,
            proposer: header.proposer_address.clone(),
        });
    }

    let genesis = height == 1 && raw.precommits.is_empty();
    if !genesis && raw.precommits.len() != registry.len() {
        return Err(TransformError::QuorumMismatch {
            height,
            precommits: raw.precommits.len(),
            validators: registry.len(),
        });
    }

    let mut signers = HashSet::with_capacity(raw.precommits.len());
    for precommit in raw.precommits.iter().flatten() {
        if !registry.contains(&precommit.validator_address) {
            return Err(TransformError::UnknownSigner {
                height,
                signer: precommit.validator_address.clone(),
            });
        }
        if !signers.insert(precommit.validator_address.as_str()) {
            return Err(TransformError::DuplicateSigner {
                height,
                signer: precommit.validator_address.clone(),
            });
        }
    }

    let signatures = registry
        .addresses()
        .map(|address| BlockSignature {
            block_height: height,
            validator_addr: address.to_string(),
            signed: signers.contains(address),
        })
        .collect();

    let transactions = raw
        .txs
        .iter()
        .enumerate()
        .map(|(index, bytes)| decode_transaction(height, index, bytes))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Block {
        height,
        time: header.time,
        hash: STANDARD.encode(&raw.hash),
        num_txs: header.num_txs,
        total_txs: header.total_txs,
        app_version: header.app_version.clone(),
        data_hash: STANDARD_NO_PAD.encode(&header.data_hash),
        last_commit_hash: STANDARD_NO_PAD.encode(&header.last_commit_hash),
        validators_hash: STANDARD_NO_PAD.encode(&header.validators_hash),
        next_validators_hash: STANDARD_NO_PAD.encode(&header.next_validators_hash),
        consensus_hash: STANDARD_NO_PAD.encode(&header.consensus_hash),
        app_hash: STANDARD_NO_PAD.encode(&header.app_hash),
        last_results_hash: STANDARD_NO_PAD.encode(&header.last_results_hash),
        proposer_address: header.proposer_address.clone(),
        transactions,
        signatures,
    })
}

/// Returns the indexed hash of an encoded transaction.
pub fn transaction_hash(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(Sha256::digest(bytes))
}

fn decode_transaction(
    height: Height,
    index: usize,
    bytes: &[u8],
) -> Result<Transaction, TransformError> {
    let malformed = |source: TxDecodeError| TransformError::MalformedTransaction {
        height,
        index,
        source,
    };
    let tx = StdTx::decode(bytes).map_err(|err| malformed(err.into()))?;
    let fee = tx.fee.unwrap_or_default();
    let (gas_fee, gas_fee_denom) = parse_coin(&fee.gas_fee)
        .ok_or_else(|| malformed(TxDecodeError::GasFee(fee.gas_fee.clone())))?;
    let hash = transaction_hash(bytes);

    let messages = tx
        .msgs
        .into_iter()
        .enumerate()
        .map(|(msg_index, msg)| {
            let (route, msg_type) = route_and_type(&msg.type_url);
            Message {
                height,
                tx_hash: hash.clone(),
                index: msg_index as u32,
                route,
                msg_type,
                payload: MessagePayload { type_url: msg.type_url, value: msg.value },
            }
        })
        .collect();

    Ok(Transaction {
        height,
        index: index as u32,
        hash,
        gas_fee,
        gas_fee_denom: gas_fee_denom.to_string(),
        gas_wanted: fee.gas_wanted,
        memo: tx.memo,
        messages,
    })
}
