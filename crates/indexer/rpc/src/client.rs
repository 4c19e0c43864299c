//! [`ChainClient`] implementation over JSON-RPC/HTTP.

use crate::{
    ChainClient, ChainClientError, RawBlock, ValidatorInfo,
    types::{ResultBlock, ResultStatus, ResultValidators},
};
use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use std::time::Duration;
use tm2_indexer_types::Height;
use tracing::trace;

/// A [`ChainClient`] talking to a Tendermint2 node's JSON-RPC endpoint.
///
/// The underlying HTTP client is cheap to clone and pools its connections, so a single instance
/// is meant to be shared by every worker. Every call is bounded by the request timeout given at
/// construction.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    client: HttpClient,
}

impl HttpChainClient {
    /// Creates a new client for the given endpoint, e.g. `http://127.0.0.1:26657`.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, ChainClientError> {
        let client = HttpClientBuilder::default().request_timeout(request_timeout).build(endpoint)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn latest_height(&self) -> Result<Height, ChainClientError> {
        let status: ResultStatus = self.client.request("status", rpc_params![]).await?;
        trace!(target: "indexer::rpc", height = status.sync_info.latest_block_height, "Fetched latest height");
        Ok(status.sync_info.latest_block_height)
    }

    async fn block_at(&self, height: Height) -> Result<RawBlock, ChainClientError> {
        let result: ResultBlock =
            self.client.request("block", rpc_params![height.to_string()]).await?;
        let block = RawBlock::from(result);

        if block.header.height != height {
            return Err(ChainClientError::InvalidResponse {
                height,
                reason: format!("node returned block {}", block.header.height),
            });
        }

        trace!(target: "indexer::rpc", height, txs = block.txs.len(), "Fetched block");
        Ok(block)
    }

    async fn validator_set_at(
        &self,
        height: Height,
    ) -> Result<Vec<ValidatorInfo>, ChainClientError> {
        let result: ResultValidators =
            self.client.request("validators", rpc_params![height.to_string()]).await?;
        Ok(result.validators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::{
        server::{ServerBuilder, ServerHandle},
        types::ErrorObjectOwned,
        RpcModule,
    };
    use serde_json::{Value, json};
    use std::net::SocketAddr;

    fn block_json(height: i64) -> Value {
        json!({
            "block_meta": {"block_id": {"hash": "AQID"}},
            "block": {
                "header": {
                    "height": height.to_string(),
                    "time": "2024-05-01T10:00:00Z",
                    "num_txs": "0",
                    "total_txs": "0",
                    "app_hash": "BAU=",
                    "proposer_address": "g1proposer"
                },
                "data": {"txs": null},
                "last_commit": {"precommits": [{"validator_address": "g1proposer", "validator_index": "0"}]}
            }
        })
    }

    /// Starts a JSON-RPC server answering like a Tendermint2 node whose tip is at `tip`.
    /// Requests for `lying_height` return a block at another height.
    async fn start_node(tip: i64, lying_height: i64) -> (SocketAddr, ServerHandle) {
        let mut module = RpcModule::new(());
        module
            .register_method("status", move |_, _, _| {
                Ok::<Value, ErrorObjectOwned>(
                    json!({"sync_info": {"latest_block_height": tip.to_string()}}),
                )
            })
            .unwrap();
        module
            .register_method("block", move |params, _, _| {
                let height: i64 = params
                    .one::<String>()?
                    .parse()
                    .map_err(|_| ErrorObjectOwned::owned(-32602, "bad height", None::<()>))?;
                let served = if height == lying_height { height + 1 } else { height };
                Ok::<Value, ErrorObjectOwned>(block_json(served))
            })
            .unwrap();
        module
            .register_method("validators", |_, _, _| {
                Ok::<Value, ErrorObjectOwned>(json!({
                    "block_height": "3",
                    "validators": [{"address": "g1proposer", "pub_key": null, "voting_power": "10"}]
                }))
            })
            .unwrap();

        let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        (addr, server.start(module))
    }

    fn client_for(addr: SocketAddr) -> HttpChainClient {
        HttpChainClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_latest_height() {
        let (addr, handle) = start_node(42, -1).await;
        let client = client_for(addr);

        assert_eq!(client.latest_height().await.unwrap(), 42);
        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_block_at() {
        let (addr, handle) = start_node(42, -1).await;
        let client = client_for(addr);

        let block = client.block_at(7).await.unwrap();
        assert_eq!(block.header.height, 7);
        assert_eq!(block.hash, vec![1, 2, 3]);
        assert_eq!(block.header.app_hash, vec![4, 5]);
        assert_eq!(block.precommits.len(), 1);
        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_block_height_mismatch_is_rejected() {
        let (addr, handle) = start_node(42, 9).await;
        let client = client_for(addr);

        let err = client.block_at(9).await.unwrap_err();
        assert!(matches!(err, ChainClientError::InvalidResponse { height: 9, .. }));
        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_validator_set_at() {
        let (addr, handle) = start_node(42, -1).await;
        let client = client_for(addr);

        let validators = client.validator_set_at(3).await.unwrap();
        assert_eq!(validators.len(), 1);
        assert_eq!(validators[0].address, "g1proposer");
        assert_eq!(validators[0].voting_power, 10);
        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_node_is_an_error() {
        // Nothing listens on port 9 of the loopback interface.
        let client =
            HttpChainClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(matches!(client.latest_height().await, Err(ChainClientError::Rpc(_))));
    }
}
