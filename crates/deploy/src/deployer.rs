use std::path::PathBuf;

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};

use crate::{
    ConfirmationOptions, NetworkConfig, ToolchainConfig,
    artifact::ArtifactStore,
    chain::ChainClient,
    compiler::{CompileOutcome, SolcCompiler},
    deployment::{DeploymentRecord, DeploymentResult},
    factory::ContractFactory,
    rpc::RpcClient,
};

/// Deploys one contract to one network.
///
/// Built by [`crate::DeployerBuilder`], which validates the target network.
#[derive(Debug, Clone)]
pub struct Deployer {
    /// Loaded toolchain configuration.
    pub config: ToolchainConfig,
    /// Name of the target network.
    pub network_name: String,
    /// Settings of the target network.
    pub network: NetworkConfig,
    /// Contract to deploy, by name or fully qualified name.
    pub contract: String,
    /// ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
    /// How to wait for the creation transaction.
    pub confirmation: ConfirmationOptions,
    /// Whether to compile the sources first.
    pub compile: bool,
    /// Dotenv file receiving the deployed address and ABI.
    pub env_file: Option<PathBuf>,
    /// Whether to write the deployment record.
    pub save_record: bool,
}

impl Deployer {
    /// Compile if requested, then deploy over JSON-RPC to the configured network.
    pub async fn deploy(&self) -> Result<DeploymentResult> {
        tracing::info!(
            network = %self.network_name,
            contract = %self.contract,
            "Starting deployment process..."
        );

        if self.compile {
            match SolcCompiler::new(&self.config).compile(false).await? {
                CompileOutcome::NoSources => {
                    tracing::debug!("No sources, deploying existing artifacts")
                }
                CompileOutcome::UpToDate => {}
                CompileOutcome::Compiled { artifacts } => {
                    tracing::debug!(artifacts, "Sources compiled")
                }
            }
        }

        let client = RpcClient::new(&self.network)
            .with_context(|| format!("Failed to create client for network '{}'", self.network_name))?;

        self.deploy_with(&client).await
    }

    /// Deploy through an existing chain client, without compiling.
    pub async fn deploy_with<C: ChainClient>(&self, client: &C) -> Result<DeploymentResult> {
        let store = ArtifactStore::new(self.config.artifacts_dir());

        let factory = ContractFactory::from_artifacts(
            &store,
            &self.contract,
            client,
            self.network_name.clone(),
            self.network.clone(),
        )?;
        let abi = factory.artifact().abi.clone();

        let pending = factory.deploy(&self.constructor_args).await?;
        tracing::info!(
            tx_hash = %pending.transaction_hash(),
            confirmations = self.confirmation.confirmations,
            "Waiting for deployment to be confirmed..."
        );

        let result = pending.deployed(&self.confirmation).await?;

        tracing::info!(
            contract = %result.contract_name,
            address = %result.address,
            block = result.block_number,
            gas_used = result.gas_used,
            "✓ Deployment complete!"
        );

        // The contract is live: persistence failures are only logged.
        if self.save_record || self.env_file.is_some() {
            let record = DeploymentRecord::new(result.clone(), abi);
            self.persist(&record);
        }

        Ok(result)
    }

    /// Write the deployment record and the dotenv export, logging failures.
    fn persist(&self, record: &DeploymentRecord) {
        if self.save_record {
            match record.save(&self.config.deployments_dir()) {
                Ok(path) => tracing::info!(path = %path.display(), "Deployment record saved"),
                Err(e) => tracing::warn!(
                    error = %format!("{:#}", e),
                    address = %record.result.address,
                    "Failed to save deployment record"
                ),
            }
        }

        if let Some(env_file) = &self.env_file {
            let path = self.config.resolve(env_file);
            if let Err(e) = record.export_env(&path) {
                tracing::warn!(
                    error = %format!("{:#}", e),
                    path = %path.display(),
                    "Failed to export contract address and ABI"
                );
            }
        }
    }
}
