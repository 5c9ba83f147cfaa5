//! Builder module for creating a [`Deployer`].
//!
//! This module provides the [`DeployerBuilder`] struct which resolves the target
//! network against the configuration and validates the deployment options
//! before anything touches the network.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};

use crate::{ConfirmationOptions, Deployer, ToolchainConfig, factory::DEFAULT_POLL_INTERVAL};

/// Contract deployed when none is selected.
pub const DEFAULT_CONTRACT: &str = "DataMarketplace";

/// Parse `0x`-prefixed (or bare) hex into raw constructor argument bytes.
pub fn parse_constructor_args(s: &str) -> Result<Bytes> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits)
        .with_context(|| format!("Invalid constructor arguments '{}': expected hex", s))?;
    Ok(Bytes::from(bytes))
}

/// Builder for creating a [`Deployer`].
///
/// # Example
///
/// ```no_run
/// use datamarket_deploy::{DeployerBuilder, ToolchainConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ToolchainConfig::load("Datamarket.toml")?;
/// let result = DeployerBuilder::new(config)
///     .network("localhost")
///     .confirmations(2)
///     .build()?
///     .deploy()
///     .await?;
/// println!("{}", result);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeployerBuilder {
    config: ToolchainConfig,
    /// Target network (optional, the configured default if not provided).
    network: Option<String>,
    /// Contract to deploy.
    contract: String,
    /// ABI-encoded constructor arguments.
    constructor_args: Bytes,
    confirmations: u64,
    wait_timeout: Duration,
    /// Whether to compile the sources before deploying.
    compile: bool,
    /// Dotenv file receiving the deployed address and ABI.
    env_file: Option<PathBuf>,
    /// Whether to write the deployment record.
    save_record: bool,
}

impl DeployerBuilder {
    /// Create a new [`DeployerBuilder`] from a loaded configuration.
    pub fn new(config: ToolchainConfig) -> Self {
        let defaults = ConfirmationOptions::default();
        Self {
            config,
            network: None,
            contract: DEFAULT_CONTRACT.to_string(),
            constructor_args: Bytes::new(),
            confirmations: defaults.confirmations,
            wait_timeout: defaults.timeout,
            compile: true,
            env_file: None,
            save_record: true,
        }
    }

    /// Set the target network.
    ///
    /// If not set, the configuration's `default_network` is used.
    pub fn network(mut self, name: impl Into<String>) -> Self {
        self.network = Some(name.into());
        self
    }

    /// Set the contract to deploy, by name or as `<source>:<Name>`.
    pub fn contract(mut self, name: impl Into<String>) -> Self {
        self.contract = name.into();
        self
    }

    pub fn constructor_args(mut self, args: Bytes) -> Self {
        self.constructor_args = args;
        self
    }

    /// Number of blocks to wait for, counting the one holding the transaction.
    pub fn confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Maximum time spent waiting for the transaction to be confirmed.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Compile the sources before deploying (default: true).
    pub fn compile(mut self, compile: bool) -> Self {
        self.compile = compile;
        self
    }

    /// Write `CONTRACT_ADDRESS` and `CONTRACT_ABI` to this dotenv file.
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Write the deployment record (default: true).
    pub fn save_record(mut self, save: bool) -> Self {
        self.save_record = save;
        self
    }

    /// Build the [`Deployer`].
    ///
    /// Fails when the network is unknown, its URL or timeout is invalid, or no
    /// confirmation is requested.
    pub fn build(self) -> Result<Deployer> {
        let network_name = self
            .network
            .unwrap_or_else(|| self.config.default_network.clone());

        let network = self.config.network(&network_name)?.clone();
        network
            .validate()
            .with_context(|| format!("Invalid configuration for network '{}'", network_name))?;

        if self.confirmations == 0 {
            anyhow::bail!("At least one confirmation is required");
        }

        if self.contract.trim().is_empty() {
            anyhow::bail!("Contract name must not be empty");
        }

        tracing::debug!(
            network = %network_name,
            url = %network.url,
            contract = %self.contract,
            confirmations = self.confirmations,
            "Building deployer..."
        );

        Ok(Deployer {
            config: self.config,
            network_name,
            network,
            contract: self.contract,
            constructor_args: self.constructor_args,
            confirmation: ConfirmationOptions {
                confirmations: self.confirmations,
                poll_interval: DEFAULT_POLL_INTERVAL,
                timeout: self.wait_timeout,
            },
            compile: self.compile,
            env_file: self.env_file,
            save_record: self.save_record,
        })
    }
}
