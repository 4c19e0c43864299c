//! Scripted chain and block builders for pipeline tests.

use crate::transformer::amino::{AnyMsg, Fee, StdTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prost::Message as _;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};
use tm2_indexer_rpc::{
    ChainClient, ChainClientError, RawBlock, RawHeader, RawPrecommit, ValidatorInfo,
};
use tm2_indexer_storage::{BlockStorage, SqliteStore, StorageError};
use tm2_indexer_types::Height;

/// Opens an in-memory store with its schema created.
pub fn memory_store() -> Result<SqliteStore, StorageError> {
    let store = SqliteStore::in_memory()?;
    store.init_schema()?;
    Ok(store)
}

/// Builds a raw block at `height` proposed by `proposer`, with one precommit slot per entry of
/// `precommits`.
pub fn raw_block(
    height: Height,
    proposer: &str,
    precommits: &[Option<&str>],
    txs: Vec<Vec<u8>>,
) -> RawBlock {
    RawBlock {
        hash: height.to_be_bytes().to_vec(),
        header: RawHeader {
            height,
            time: DateTime::<Utc>::from_timestamp(1_700_000_000 + height, 0).unwrap_or_default(),
            num_txs: txs.len() as i64,
            total_txs: txs.len() as i64,
            app_version: "1.0.0".to_string(),
            data_hash: Vec::new(),
            last_commit_hash: Vec::new(),
            validators_hash: vec![1; 32],
            next_validators_hash: vec![1; 32],
            consensus_hash: vec![2; 32],
            app_hash: Vec::new(),
            last_results_hash: Vec::new(),
            proposer_address: proposer.to_string(),
        },
        txs,
        precommits: precommits
            .iter()
            .enumerate()
            .map(|(index, address)| {
                address.map(|address| RawPrecommit {
                    validator_address: address.to_string(),
                    validator_index: index as i64,
                })
            })
            .collect(),
    }
}

/// Encodes a transaction carrying `msgs` as `(type_url, value)` pairs, paying `gas_fee` ugnot.
pub fn encode_tx(msgs: &[(&str, &[u8])], gas_wanted: i64, gas_fee: i64, memo: &str) -> Vec<u8> {
    StdTx {
        msgs: msgs
            .iter()
            .map(|(type_url, value)| AnyMsg { type_url: type_url.to_string(), value: value.to_vec() })
            .collect(),
        fee: Some(Fee { gas_wanted, gas_fee: format!("{gas_fee}ugnot") }),
        memo: memo.to_string(),
    }
    .encode_to_vec()
}

/// An in-memory chain whose blocks, tip and failures are driven by the test.
///
/// Heights without a scripted block are served as a block proposed by the first validator and
/// signed by every validator.
#[derive(Debug, Default)]
pub struct ScriptedChain {
    tip: AtomicI64,
    validators: Mutex<Vec<String>>,
    blocks: Mutex<BTreeMap<Height, RawBlock>>,
    failing: Mutex<HashSet<Height>>,
    latency: Mutex<Option<Duration>>,
}

impl ScriptedChain {
    /// Creates a chain at `tip` run by `validators`.
    pub fn new(tip: Height, validators: &[&str]) -> Self {
        let chain = Self::default();
        chain.set_tip(tip);
        chain.set_validators(validators);
        chain
    }

    /// Moves the chain tip.
    pub fn set_tip(&self, tip: Height) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    /// Replaces the validator set.
    pub fn set_validators(&self, validators: &[&str]) {
        *self.validators.lock().unwrap_or_else(PoisonError::into_inner) =
            validators.iter().map(|v| v.to_string()).collect();
    }

    /// Serves `block` at its height instead of the default block.
    pub fn insert_block(&self, block: RawBlock) {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(block.header.height, block);
    }

    /// Makes every fetch of `height` fail.
    pub fn fail_height(&self, height: Height) {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner).insert(height);
    }

    /// Delays every block fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = Some(latency);
    }

    fn validators(&self) -> Vec<String> {
        self.validators.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn latest_height(&self) -> Result<Height, ChainClientError> {
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn block_at(&self, height: Height) -> Result<RawBlock, ChainClientError> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let fails = self.failing.lock().unwrap_or_else(PoisonError::into_inner).contains(&height);
        if fails || height > self.tip.load(Ordering::SeqCst) {
            return Err(ChainClientError::InvalidResponse {
                height,
                reason: "scripted failure".to_string(),
            });
        }

        if let Some(block) = self.blocks.lock().unwrap_or_else(PoisonError::into_inner).get(&height)
        {
            return Ok(block.clone());
        }

        let validators = self.validators();
        let proposer = validators.first().cloned().unwrap_or_default();
        let precommits: Vec<Option<&str>> = if height == 1 {
            Vec::new()
        } else {
            validators.iter().map(|v| Some(v.as_str())).collect()
        };
        Ok(raw_block(height, &proposer, &precommits, Vec::new()))
    }

    async fn validator_set_at(&self, _height: Height) -> Result<Vec<ValidatorInfo>, ChainClientError> {
        Ok(self
            .validators()
            .into_iter()
            .map(|address| ValidatorInfo { address, pub_key: None, voting_power: 10 })
            .collect())
    }
}
