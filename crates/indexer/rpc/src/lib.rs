//! Chain client for Tendermint2 (gno.land) nodes.
//!
//! The indexer only needs three read calls from a node: the latest height, the block at a
//! height and the validator set at a height. They are captured by the [`ChainClient`] trait;
//! [`HttpChainClient`] implements it over JSON-RPC/HTTP.

mod client;
pub use client::HttpChainClient;

mod error;
pub use error::ChainClientError;

mod serde_helpers;

mod traits;
#[cfg(any(test, feature = "test-utils"))]
pub use traits::MockChainClient;
pub use traits::ChainClient;

mod types;
pub use types::{RawBlock, RawHeader, RawPrecommit, ValidatorInfo};
