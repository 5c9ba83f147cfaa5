//! Contract factory: binds an artifact to a chain and deploys it.

use std::{fmt, time::Duration};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use tokio::time::Instant;

use crate::{
    NetworkConfig,
    artifact::{Artifact, ArtifactStore},
    chain::{ChainClient, TransactionReceipt, TransactionRequest},
    deployment::DeploymentResult,
};

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default limit on the time spent waiting for confirmations.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Returned by a poll while the chain has not reached the awaited state.
#[derive(Debug)]
struct Pending;

impl fmt::Display for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not yet confirmed")
    }
}

impl std::error::Error for Pending {}

/// How to wait for a deployment to be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationOptions {
    /// Blocks the creation transaction must be buried under, counting its own.
    pub confirmations: u64,
    /// Interval between polls.
    pub poll_interval: Duration,
    /// Maximum time spent waiting.
    pub timeout: Duration,
}

impl Default for ConfirmationOptions {
    fn default() -> Self {
        Self {
            confirmations: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl ConfirmationOptions {
    fn max_polls(&self) -> usize {
        let interval = self.poll_interval.as_millis().max(1);
        (self.timeout.as_millis() / interval).max(1) as usize
    }
}

/// Deploys one compiled contract through a [`ChainClient`].
pub struct ContractFactory<'a, C> {
    artifact: Artifact,
    client: &'a C,
    network_name: String,
    network: NetworkConfig,
}

impl<'a, C: ChainClient> ContractFactory<'a, C> {
    pub fn new(
        artifact: Artifact,
        client: &'a C,
        network_name: impl Into<String>,
        network: NetworkConfig,
    ) -> Self {
        Self {
            artifact,
            client,
            network_name: network_name.into(),
            network,
        }
    }

    /// Look up the artifact of `contract` and bind it to `client`.
    pub fn from_artifacts(
        store: &ArtifactStore,
        contract: &str,
        client: &'a C,
        network_name: impl Into<String>,
        network: NetworkConfig,
    ) -> Result<Self> {
        let artifact = store
            .find(contract)
            .with_context(|| format!("Failed to get contract factory for {}", contract))?;
        Ok(Self::new(artifact, client, network_name, network))
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Sender configured for the network, or the first account of the node.
    async fn sender(&self) -> Result<Address> {
        if let Some(from) = self.network.from {
            return Ok(from);
        }

        self.client
            .accounts()
            .await
            .context("Failed to list node accounts")?
            .first()
            .copied()
            .context("The node exposes no unlocked account to deploy from")
    }

    /// Submit the creation transaction.
    ///
    /// `constructor_args` are appended to the creation code as they are, so
    /// they must already be ABI-encoded.
    pub async fn deploy(&self, constructor_args: &[u8]) -> Result<PendingDeployment<'a, C>> {
        let chain_id = self
            .client
            .chain_id()
            .await
            .with_context(|| format!("Failed to connect to network '{}'", self.network_name))?;

        if let Some(expected) = self.network.chain_id
            && expected != chain_id
        {
            anyhow::bail!(
                "Network '{}' is configured with chain id {} but the node reports {}",
                self.network_name,
                expected,
                chain_id
            );
        }

        let from = self.sender().await?;
        let tx = TransactionRequest {
            from,
            data: self.artifact.creation_code(constructor_args)?,
            gas: self.network.gas,
            gas_price: self.network.gas_price,
        };

        tracing::debug!(
            contract = %self.artifact.contract_name,
            %from,
            chain_id,
            size = tx.data.len(),
            "Sending creation transaction..."
        );

        let tx_hash = self
            .client
            .send_transaction(&tx)
            .await
            .with_context(|| format!("Failed to deploy {}", self.artifact.contract_name))?;

        tracing::info!(
            contract = %self.artifact.contract_name,
            network = %self.network_name,
            %tx_hash,
            "Creation transaction sent"
        );

        Ok(PendingDeployment {
            client: self.client,
            tx_hash,
            from,
            chain_id,
            contract_name: self.artifact.contract_name.clone(),
            network_name: self.network_name.clone(),
        })
    }
}

/// A submitted creation transaction. The contract address is only known once
/// [`PendingDeployment::deployed`] returns.
pub struct PendingDeployment<'a, C> {
    client: &'a C,
    tx_hash: B256,
    from: Address,
    chain_id: u64,
    contract_name: String,
    network_name: String,
}

impl<C: ChainClient> PendingDeployment<'_, C> {
    pub fn transaction_hash(&self) -> B256 {
        self.tx_hash
    }

    /// Wait for the creation transaction to be mined and confirmed.
    ///
    /// `options.timeout` bounds the whole wait, RPC calls included.
    pub async fn deployed(self, options: &ConfirmationOptions) -> Result<DeploymentResult> {
        let deadline = Instant::now() + options.timeout;
        let receipt = self.wait_for_receipt(options, deadline).await?;

        if receipt.reverted() {
            anyhow::bail!(
                "Deployment of {} reverted (transaction {})",
                self.contract_name,
                self.tx_hash
            );
        }

        let address = receipt.contract_address.with_context(|| {
            format!(
                "Receipt of transaction {} has no contract address",
                self.tx_hash
            )
        })?;

        if options.confirmations > 1 {
            self.wait_for_confirmations(&receipt, options, deadline)
                .await?;
        }

        tracing::debug!(
            contract = %self.contract_name,
            %address,
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "Deployment confirmed"
        );

        Ok(DeploymentResult {
            contract_name: self.contract_name,
            address,
            transaction_hash: self.tx_hash,
            block_number: receipt.block_number,
            deployer: self.from,
            network: self.network_name,
            chain_id: self.chain_id,
            gas_used: receipt.gas_used,
        })
    }

    async fn wait_for_receipt(
        &self,
        options: &ConfirmationOptions,
        deadline: Instant,
    ) -> Result<TransactionReceipt> {
        let client = self.client;
        let tx_hash = self.tx_hash;

        // Only a missing receipt is retried; transport errors fail right away.
        let polling = (|| async move {
            client
                .transaction_receipt(tx_hash)
                .await?
                .ok_or_else(|| anyhow::Error::new(Pending))
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(options.poll_interval)
                .with_max_times(options.max_polls()),
        )
        .when(|e: &anyhow::Error| e.is::<Pending>())
        .notify(|_, after| tracing::trace!(%tx_hash, ?after, "Receipt not available yet"));

        match tokio::time::timeout_at(deadline, polling).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(e)) if !e.is::<Pending>() => {
                Err(e.context(format!("Failed to get receipt of transaction {}", tx_hash)))
            }
            _ => anyhow::bail!(
                "Transaction {} was not mined within {:?}",
                tx_hash,
                options.timeout
            ),
        }
    }

    async fn wait_for_confirmations(
        &self,
        receipt: &TransactionReceipt,
        options: &ConfirmationOptions,
        deadline: Instant,
    ) -> Result<()> {
        let client = self.client;
        let target = receipt
            .block_number
            .checked_add(options.confirmations - 1)
            .with_context(|| {
                format!(
                    "{} confirmations cannot be reached from block {}",
                    options.confirmations, receipt.block_number
                )
            })?;

        tracing::info!(
            confirmations = options.confirmations,
            target_block = target,
            "Waiting for confirmations..."
        );

        let polling = (|| async move {
            let head = client.block_number().await?;
            if head >= target {
                Ok(head)
            } else {
                Err(anyhow::Error::new(Pending))
            }
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(options.poll_interval)
                .with_max_times(options.max_polls()),
        )
        .when(|e: &anyhow::Error| e.is::<Pending>());

        match tokio::time::timeout_at(deadline, polling).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if !e.is::<Pending>() => Err(e.context("Failed to get block number")),
            _ => anyhow::bail!(
                "Block {} was not reached within {:?}",
                target,
                options.timeout
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls() {
        let options = ConfirmationOptions {
            confirmations: 1,
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(options.max_polls(), 20);

        let tiny = ConfirmationOptions {
            timeout: Duration::from_millis(1),
            ..options
        };
        assert_eq!(tiny.max_polls(), 1);
    }
}
