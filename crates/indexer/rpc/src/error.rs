use thiserror::Error;
use tm2_indexer_types::Height;

/// Errors returned by a [`ChainClient`](crate::ChainClient).
#[derive(Debug, Error)]
pub enum ChainClientError {
    /// The JSON-RPC call failed: transport error, timeout, RPC error object or a body that does
    /// not deserialize into the expected result.
    #[error(transparent)]
    Rpc(#[from] jsonrpsee::core::ClientError),

    /// The node answered, but the answer is inconsistent with the request.
    #[error("invalid response for height {height}: {reason}")]
    InvalidResponse {
        /// The requested height.
        height: Height,
        /// What is wrong with the response.
        reason: String,
    },
}
