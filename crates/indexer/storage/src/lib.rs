//! Persistence layer of the tm2 indexer.
//!
//! [`BlockStorage`] is the contract the ingestion pipeline writes through. Every write is
//! idempotent: storing a block, signature, transaction or message that already exists is a
//! no-op, so overlapping or replayed heights are always safe to write again.
//!
//! [`SqliteStore`] implements the contract on top of SQLite.

mod error;
pub use error::StorageError;

mod schema;

mod sqlite;
pub use sqlite::{RowCounts, SqliteStore};

mod traits;
#[cfg(any(test, feature = "test-utils"))]
pub use traits::MockBlockStorage;
pub use traits::BlockStorage;
