//! Toolchain configuration: compiler settings, project paths and target networks.
//!
//! The configuration is a plain value built by the caller and passed to every
//! operation. [`ToolchainConfig::load`] layers it from defaults, a TOML file and
//! the environment:
//!
//! 1. built-in defaults (a single `localhost` network),
//! 2. the TOML file (`Datamarket.toml` by default),
//! 3. `GANACHE_URL`, which overrides `networks.localhost.url`,
//! 4. `DATAMARKET_*` variables, with `__` separating nested keys
//!    (e.g. `DATAMARKET_NETWORKS__LOCALHOST__TIMEOUT=1000`).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default name of the toolchain configuration file.
pub const CONFIG_FILENAME: &str = "Datamarket.toml";

/// Prefix of the environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "DATAMARKET_";

/// Legacy variable pointing at the local Ganache node.
pub const GANACHE_URL_ENV: &str = "GANACHE_URL";

/// Default Solidity compiler version.
pub const DEFAULT_SOLC_VERSION: &str = "0.8.0";

/// Name of the network used when none is selected.
pub const DEFAULT_NETWORK: &str = "localhost";

/// Default endpoint of the `localhost` network.
pub const DEFAULT_LOCALHOST_URL: &str = "http://127.0.0.1:8545";

/// Default RPC request timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default number of optimizer runs.
pub const DEFAULT_OPTIMIZER_RUNS: u32 = 200;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Solidity optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub enabled: bool,
    pub runs: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: DEFAULT_OPTIMIZER_RUNS,
        }
    }
}

/// Project directories. Relative paths are resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Solidity sources.
    pub sources: PathBuf,
    /// Compiled contract artifacts.
    pub artifacts: PathBuf,
    /// Compiler cache.
    pub cache: PathBuf,
    /// Deployment records, one sub-directory per network.
    pub deployments: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: PathBuf::from("contracts"),
            artifacts: PathBuf::from("artifacts"),
            cache: PathBuf::from("cache"),
            deployments: PathBuf::from("deployments"),
        }
    }
}

/// A target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    /// Milliseconds before an RPC request is considered failed.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Expected chain id. Deploying against a node reporting another id fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Sender of the deployment transaction. Must be unlocked on the node.
    /// Defaults to the first account returned by `eth_accounts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Gas limit of the deployment transaction. Estimated by the node if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Gas price in wei. Chosen by the node if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

impl NetworkConfig {
    /// Create a network with the given endpoint and the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT_MS,
            chain_id: None,
            from: None,
            gas: None,
            gas_price: None,
        }
    }

    /// Set the request timeout in milliseconds.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    /// Set the expected chain id.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Set the sender account.
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Check the network settings and return the parsed endpoint.
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .with_context(|| format!("Invalid network url '{}'", self.url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Unsupported network url scheme '{}' in '{}': expected http or https",
                url.scheme(),
                self.url
            );
        }

        if self.timeout == 0 {
            anyhow::bail!(
                "Network timeout must be greater than zero milliseconds (url: {})",
                self.url
            );
        }

        Ok(url)
    }
}

/// Complete toolchain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Solidity compiler version.
    pub solidity: String,
    /// Optimizer settings passed to the compiler.
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Network used when none is selected on the command line.
    pub default_network: String,
    /// Project directories.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Target networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            DEFAULT_NETWORK.to_string(),
            NetworkConfig::new(DEFAULT_LOCALHOST_URL),
        );

        Self {
            solidity: DEFAULT_SOLC_VERSION.to_string(),
            optimizer: OptimizerConfig::default(),
            default_network: DEFAULT_NETWORK.to_string(),
            paths: PathsConfig::default(),
            networks,
            root: PathBuf::new(),
        }
    }
}

impl ToolchainConfig {
    /// Build the layered figment for a configuration file.
    ///
    /// The file is optional: a missing file leaves the defaults untouched.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ToolchainConfig::default()))
            .merge(Toml::file(path))
            .merge(
                Env::raw()
                    .only(&[GANACHE_URL_ENV])
                    .map(|_| "networks.localhost.url".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the layered configuration (defaults, file, environment).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        config.root = project_root(path);

        tracing::debug!(
            path = %path.display(),
            solidity = %config.solidity,
            networks = ?config.networks.keys().collect::<Vec<_>>(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, without defaults or environment.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        config.root = project_root(path);
        Ok(config)
    }

    /// Look up a network by name.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).with_context(|| {
            format!(
                "Network '{}' is not configured. Known networks: [{}]",
                name,
                self.networks
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }

    /// Resolve a project-relative path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.resolve(&self.paths.sources)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.resolve(&self.paths.artifacts)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.paths.cache)
    }

    pub fn deployments_dir(&self) -> PathBuf {
        self.resolve(&self.paths.deployments)
    }
}

fn project_root(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}
