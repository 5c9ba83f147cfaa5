//! Chain access used by the contract factory.
//!
//! [`ChainClient`] is the narrow set of JSON-RPC calls a deployment needs. The
//! HTTP implementation lives in [`crate::rpc::RpcClient`].

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A contract creation transaction, sent from an account unlocked on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sender account.
    pub from: Address,
    /// Creation code followed by the ABI-encoded constructor arguments.
    pub data: Bytes,
    /// Gas limit. The node estimates it when unset.
    pub gas: Option<u64>,
    /// Gas price in wei. The node picks it when unset.
    pub gas_price: Option<u64>,
}

impl TransactionRequest {
    /// JSON-RPC representation for `eth_sendTransaction`.
    pub fn to_rpc_params(&self) -> Value {
        let mut tx = serde_json::json!({
            "from": format!("0x{}", hex::encode(self.from)),
            "data": format!("0x{}", hex::encode(&self.data)),
        });

        if let Some(gas) = self.gas {
            tx["gas"] = Value::String(format!("0x{:x}", gas));
        }
        if let Some(gas_price) = self.gas_price {
            tx["gasPrice"] = Value::String(format!("0x{:x}", gas_price));
        }

        tx
    }
}

/// The subset of a transaction receipt needed to confirm a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `1` for success, `0` for revert. Absent on pre-Byzantium nodes.
    #[serde(default, with = "hex_u64_opt")]
    pub status: Option<u64>,
    #[serde(default, with = "hex_u64")]
    pub gas_used: u64,
}

impl TransactionReceipt {
    pub fn reverted(&self) -> bool {
        self.status == Some(0)
    }
}

/// JSON-RPC calls needed to deploy a contract.
pub trait ChainClient: Send + Sync {
    /// `eth_chainId`.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// `eth_accounts`: accounts the node can sign for.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    /// `eth_blockNumber`.
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// `eth_sendTransaction`: returns the transaction hash.
    fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// `eth_getTransactionReceipt`: `None` while the transaction is pending.
    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send;
}

/// Parse a hex quantity (`0x`-prefixed) into a u64.
pub fn parse_quantity(s: &str) -> Result<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("Quantity '{}' is missing the 0x prefix", s))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| anyhow::anyhow!("Invalid hex quantity '{}': {}", s, e))
}

/// (De)serialize a u64 as a hex quantity.
pub(crate) mod hex_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        super::parse_quantity(&s).map_err(serde::de::Error::custom)
    }
}

/// (De)serialize an optional u64 as a hex quantity.
pub(crate) mod hex_u64_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::hex_u64::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        let s: Option<String> = Deserialize::deserialize(deserializer)?;
        s.map(|s| super::parse_quantity(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
