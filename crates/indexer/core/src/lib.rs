//! Ingestion pipeline of the tm2 indexer.
//!
//! The pipeline is made of three stages connected by bounded queues:
//!
//! - the [`HeightSupply`] decides which heights to fetch: missing heights first, then the range up
//!   to the chain tip, then new blocks as the chain grows;
//! - the [`WorkerPool`] fetches each height from the node and turns the raw block into an indexable
//!   [`Block`](tm2_indexer_types::Block) with [`transform_block`], checked against the
//!   [`ValidatorRegistry`];
//! - the [`BatchWriter`] persists blocks in batches whose size follows the height backlog.
//!
//! The [`Indexer`] wires the stages together and handles startup and shutdown.

mod config;
pub use config::{InvalidPipelineConfig, PipelineConfig};

mod fetcher;
pub use fetcher::{BlockFetcher, FetchError, SkipReason};

mod indexer;
pub use indexer::{Indexer, IndexerError, IndexerReport};

mod metrics;

mod registry;
pub use registry::{RegistryError, ValidatorRegistry};

mod supply;
pub use supply::{HeightSource, HeightSupply, SupplyConfig, SupplyError};

mod transformer;
pub use transformer::{TransformError, TxDecodeError, transaction_hash, transform_block};

mod worker;
pub use worker::{WorkerPool, WorkerReport};

mod writer;
pub use writer::{BatchWriter, WriterReport};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
