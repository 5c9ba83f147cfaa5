//! Deployment results and their on-disk records.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable holding the deployed contract address.
pub const CONTRACT_ADDRESS_ENV: &str = "CONTRACT_ADDRESS";
/// Environment variable holding the deployed contract ABI (compact JSON).
pub const CONTRACT_ABI_ENV: &str = "CONTRACT_ABI";

/// A confirmed contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub contract_name: String,
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub deployer: Address,
    pub network: String,
    pub chain_id: u64,
    pub gas_used: u64,
}

impl fmt::Display for DeploymentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} deployed to: {}", self.contract_name, self.address)
    }
}

/// What is kept on disk for a deployment: the result, the ABI and a timestamp.
///
/// Stored at `<deployments>/<network>/<ContractName>.json` and overwritten by
/// each new deployment of that contract on that network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    #[serde(flatten)]
    pub result: DeploymentResult,
    pub abi: Value,
    /// Unix timestamp of the confirmation.
    pub deployed_at: i64,
}

impl DeploymentRecord {
    pub fn new(result: DeploymentResult, abi: Value) -> Self {
        Self {
            result,
            abi,
            deployed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Path of the record for `contract_name` on `network`.
    pub fn path(deployments_dir: &Path, network: &str, contract_name: &str) -> PathBuf {
        deployments_dir
            .join(network)
            .join(format!("{}.json", contract_name))
    }

    /// Save the record under the deployments directory and return its path.
    pub fn save(&self, deployments_dir: &Path) -> Result<PathBuf> {
        let path = Self::path(
            deployments_dir,
            &self.result.network,
            &self.result.contract_name,
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write deployment record to {}", path.display()))?;

        Ok(path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment record does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse deployment record JSON")
    }

    /// Set `CONTRACT_ADDRESS` and `CONTRACT_ABI` in a dotenv file.
    ///
    /// Other lines are kept as they are; the file is created if missing.
    pub fn export_env(&self, path: &Path) -> Result<()> {
        let existing = if path.exists() {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            String::new()
        };

        let abi = serde_json::to_string(&self.abi).context("Failed to serialize ABI")?;
        let updated = upsert_env(
            &existing,
            &[
                (CONTRACT_ADDRESS_ENV, self.result.address.to_string()),
                (CONTRACT_ABI_ENV, format!("'{}'", abi)),
            ],
        );

        std::fs::write(path, updated)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), "Contract address and ABI exported");
        Ok(())
    }
}

/// Replace `KEY=...` lines for the given keys, appending the missing ones.
fn upsert_env(content: &str, vars: &[(&str, String)]) -> String {
    let mut seen = vec![false; vars.len()];
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let key = line
                .trim_start()
                .trim_start_matches("export ")
                .split('=')
                .next()
                .unwrap_or_default()
                .trim();

            match vars.iter().position(|(name, _)| *name == key) {
                Some(i) => {
                    seen[i] = true;
                    format!("{}={}", vars[i].0, vars[i].1)
                }
                None => line.to_string(),
            }
        })
        .collect();

    for (i, (name, value)) in vars.iter().enumerate() {
        if !seen[i] {
            lines.push(format!("{}={}", name, value));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
