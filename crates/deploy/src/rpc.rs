//! JSON-RPC client for Ethereum-compatible nodes.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::{
    NetworkConfig,
    chain::{ChainClient, TransactionReceipt, TransactionRequest, parse_quantity},
};

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request to {}", method, url))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error from {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// [`ChainClient`] over HTTP JSON-RPC.
///
/// Every request is bounded by the network's `timeout`.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: Url,
}

impl RpcClient {
    /// Create a client for a configured network.
    pub fn new(network: &NetworkConfig) -> Result<Self, anyhow::Error> {
        let url = network.validate()?;
        let client = create_client(network.timeout())?;
        Ok(Self { client, url })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        tracing::trace!(method, url = %self.url, "JSON-RPC request");
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn call_quantity(&self, method: &str) -> Result<u64, anyhow::Error> {
        let quantity: String = self.call(method, vec![]).await?;
        parse_quantity(&quantity)
    }
}

impl ChainClient for RpcClient {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        self.call_quantity("eth_chainId").await
    }

    async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        self.call("eth_accounts", vec![]).await
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        self.call_quantity("eth_blockNumber").await
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> anyhow::Result<B256> {
        self.call("eth_sendTransaction", vec![tx.to_rpc_params()])
            .await
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> anyhow::Result<Option<TransactionReceipt>> {
        self.call(
            "eth_getTransactionReceipt",
            vec![Value::String(format!("0x{}", hex::encode(tx_hash)))],
        )
        .await
    }
}
