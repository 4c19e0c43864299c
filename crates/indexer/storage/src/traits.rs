use crate::StorageError;
use std::fmt::Debug;
use tm2_indexer_types::{Block, Height, Validator};

/// Storage contract of the ingestion pipeline.
///
/// All writes are idempotent. Implementations must be safe to share between threads; the
/// pipeline funnels every block write through a single writer, but reads may happen
/// concurrently.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait BlockStorage: Debug + Send + Sync {
    /// Creates the tables and indexes if they do not exist yet.
    fn init_schema(&self) -> Result<(), StorageError>;

    /// Returns the highest stored block height, or `1` if no block is stored.
    fn latest_stored_height(&self) -> Result<Height, StorageError>;

    /// Returns, in ascending order, every height in `1..=max(height)` that has no stored block.
    ///
    /// Returns an empty list when no block is stored.
    fn missing_heights(&self) -> Result<Vec<Height>, StorageError>;

    /// Stores the given validators, ignoring the ones already known.
    fn upsert_validators(&self, validators: &[Validator]) -> Result<(), StorageError>;

    /// Stores the given blocks with their signatures, transactions and messages.
    ///
    /// The whole batch is written atomically: either every record of every block is stored or
    /// nothing is. Records that already exist are left untouched.
    fn upsert_block_batch(&self, blocks: &[Block]) -> Result<(), StorageError>;
}
