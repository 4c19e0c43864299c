//! SQLite implementation of [`BlockStorage`].

use crate::{BlockStorage, StorageError, schema};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};
use tm2_indexer_types::{
    Block, BlockSignature, Height, Message, MessagePayload, Transaction, Validator,
};
use tracing::{debug, info};

/// A [`BlockStorage`] backed by a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Number of rows per table, used to check idempotency and for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// Rows in `validators`.
    pub validators: u64,
    /// Rows in `blocks`.
    pub blocks: u64,
    /// Rows in `block_signatures`.
    pub signatures: u64,
    /// Rows in `transactions`.
    pub transactions: u64,
    /// Rows in `messages`.
    pub messages: u64,
}

impl SqliteStore {
    /// Opens, or creates, the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(schema::PRAGMAS)?;
        info!(target: "indexer::storage", path = %path.as_ref().display(), "Opened SQLite database");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Returns the number of rows of every table.
    pub fn row_counts(&self) -> Result<RowCounts, StorageError> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64, StorageError> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(n as u64)
        };

        Ok(RowCounts {
            validators: count("validators")?,
            blocks: count("blocks")?,
            signatures: count("block_signatures")?,
            transactions: count("transactions")?,
            messages: count("messages")?,
        })
    }

    /// Reads back the stored block at `height` with all its nested records.
    ///
    /// Signatures are returned ordered by validator address, transactions and messages by
    /// their index.
    pub fn block(&self, height: Height) -> Result<Option<Block>, StorageError> {
        let conn = self.lock()?;

        let block = conn
            .query_row(
                "SELECT height, time, hash, num_txs, total_txs, app_version, data_hash,
                        last_commit_hash, validators_hash, next_validators_hash, consensus_hash,
                        app_hash, last_results_hash, proposer_address
                 FROM blocks WHERE height = ?1",
                [height],
                |r| {
                    let time: String = r.get(1)?;
                    Ok(Block {
                        height: r.get(0)?,
                        time: parse_time(&time).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                        })?,
                        hash: r.get(2)?,
                        num_txs: r.get(3)?,
                        total_txs: r.get(4)?,
                        app_version: r.get(5)?,
                        data_hash: r.get(6)?,
                        last_commit_hash: r.get(7)?,
                        validators_hash: r.get(8)?,
                        next_validators_hash: r.get(9)?,
                        consensus_hash: r.get(10)?,
                        app_hash: r.get(11)?,
                        last_results_hash: r.get(12)?,
                        proposer_address: r.get(13)?,
                        transactions: Vec::new(),
                        signatures: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut block) = block else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT validator_addr, signed FROM block_signatures
             WHERE block_height = ?1 ORDER BY validator_addr",
        )?;
        block.signatures = stmt
            .query_map([height], |r| {
                Ok(BlockSignature { block_height: height, validator_addr: r.get(0)?, signed: r.get(1)? })
            })?
            .collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT tx_index, hash, gas_fee, gas_denom, gas_wanted, memo FROM transactions
             WHERE height = ?1 ORDER BY tx_index",
        )?;
        block.transactions = stmt
            .query_map([height], |r| {
                Ok(Transaction {
                    height,
                    index: r.get(0)?,
                    hash: r.get(1)?,
                    gas_fee: r.get(2)?,
                    gas_fee_denom: r.get(3)?,
                    gas_wanted: r.get(4)?,
                    memo: r.get(5)?,
                    messages: Vec::new(),
                })
            })?
            .collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            r#"SELECT "index", route, type, msg_raw FROM messages
               WHERE height = ?1 AND tx_hash = ?2 ORDER BY "index""#,
        )?;
        for tx in &mut block.transactions {
            let rows = stmt
                .query_map(params![height, tx.hash], |r| {
                    Ok((r.get::<_, u32>(0)?, r.get(1)?, r.get(2)?, r.get::<_, String>(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (index, route, msg_type, raw) in rows {
                tx.messages.push(Message {
                    height,
                    tx_hash: tx.hash.clone(),
                    index,
                    route,
                    msg_type,
                    payload: parse_payload(&raw)?,
                });
            }
        }

        Ok(Some(block))
    }
}

fn parse_time(raw: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

fn parse_payload(raw: &str) -> Result<MessagePayload, StorageError> {
    let json: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| StorageError::CorruptRow(format!("invalid msg_raw: {e}")))?;
    let type_url = json["@type"]
        .as_str()
        .ok_or_else(|| StorageError::CorruptRow("msg_raw without @type".to_string()))?;
    let value = json["value"]
        .as_str()
        .map(|v| STANDARD.decode(v))
        .transpose()
        .map_err(|e| StorageError::CorruptRow(format!("invalid msg_raw value: {e}")))?
        .unwrap_or_default();

    Ok(MessagePayload { type_url: type_url.to_string(), value })
}

impl BlockStorage for SqliteStore {
    fn init_schema(&self) -> Result<(), StorageError> {
        self.lock()?.execute_batch(schema::CREATE_TABLES)?;
        Ok(())
    }

    fn latest_stored_height(&self) -> Result<Height, StorageError> {
        Ok(self.lock()?.query_row(schema::LATEST_HEIGHT, [], |r| r.get(0))?)
    }

    fn missing_heights(&self) -> Result<Vec<Height>, StorageError> {
        let conn = self.lock()?;
        let max: Option<Height> = conn.query_row(schema::MAX_HEIGHT, [], |r| r.get(0))?;
        let Some(max) = max else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(schema::MISSING_HEIGHTS)?;
        let heights = stmt.query_map([max], |r| r.get(0))?.collect::<Result<Vec<Height>, _>>()?;
        Ok(heights)
    }

    fn upsert_validators(&self, validators: &[Validator]) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(schema::INSERT_VALIDATOR)?;
            for validator in validators {
                insert.execute(params![validator.address, validator.name])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_block_batch(&self, blocks: &[Block]) -> Result<(), StorageError> {
        if blocks.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut insert_block = tx.prepare_cached(schema::INSERT_BLOCK)?;
            let mut insert_signature = tx.prepare_cached(schema::INSERT_SIGNATURE)?;
            let mut insert_transaction = tx.prepare_cached(schema::INSERT_TRANSACTION)?;
            let mut insert_message = tx.prepare_cached(schema::INSERT_MESSAGE)?;

            for block in blocks {
                inserted += insert_block.execute(params![
                    block.height,
                    block.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    block.hash,
                    block.num_txs,
                    block.total_txs,
                    block.app_version,
                    block.data_hash,
                    block.last_commit_hash,
                    block.validators_hash,
                    block.next_validators_hash,
                    block.consensus_hash,
                    block.app_hash,
                    block.last_results_hash,
                    block.proposer_address,
                ])?;

                for signature in &block.signatures {
                    insert_signature.execute(params![
                        signature.block_height,
                        signature.validator_addr,
                        signature.signed,
                    ])?;
                }

                for transaction in &block.transactions {
                    insert_transaction.execute(params![
                        transaction.height,
                        transaction.index,
                        transaction.hash,
                        transaction.gas_fee,
                        transaction.gas_fee_denom,
                        transaction.gas_wanted,
                        transaction.memo,
                    ])?;

                    for message in &transaction.messages {
                        insert_message.execute(params![
                            message.height,
                            message.tx_hash,
                            message.index,
                            message.route,
                            message.msg_type,
                            message.payload.to_json().to_string(),
                        ])?;
                    }
                }
            }
        }
        tx.commit()?;

        debug!(
            target: "indexer::storage",
            batch = blocks.len(),
            inserted,
            "Committed block batch"
        );
        Ok(())
    }
}
