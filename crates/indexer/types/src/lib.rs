//! Records produced by the tm2 indexer and persisted by its storage layer.
//!
//! A [`Block`] owns its [`BlockSignature`]s and [`Transaction`]s, and every [`Transaction`] owns
//! its [`Message`]s. None of the nested records is ever persisted on its own.

mod block;
pub use block::{Block, BlockSignature};

mod transaction;
pub use transaction::{Message, MessagePayload, Transaction};

mod validator;
pub use validator::Validator;

/// A block height. Heights start at 1 and are the ordering key of the whole pipeline.
pub type Height = i64;
