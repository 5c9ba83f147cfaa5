use std::path::PathBuf;

use clap::{Parser, Subcommand};
use datamarket_deploy::{CONFIG_FILENAME, DEFAULT_CONTRACT};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "datamarket")]
#[command(
    author,
    version,
    about = "Compile and deploy the DataMarketplace contract"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "DATAMARKET_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the toolchain configuration file.
    ///
    /// A missing file is not an error: the defaults and the environment apply.
    #[arg(short, long, global = true, env = "DATAMARKET_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Compile the Solidity sources into artifacts.
    Compile {
        /// Compile even if the sources are unchanged.
        #[arg(long, env = "DATAMARKET_FORCE_COMPILE")]
        force: bool,
    },

    /// Deploy a compiled contract and print its address.
    Deploy(DeployArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct DeployArgs {
    /// Name of the target network. Defaults to `default_network` from the configuration.
    #[arg(short, long, env = "DATAMARKET_NETWORK")]
    pub network: Option<String>,

    /// Contract to deploy, by name or as `<source>:<Name>`.
    #[arg(long, env = "DATAMARKET_CONTRACT", default_value = DEFAULT_CONTRACT)]
    pub contract: String,

    /// ABI-encoded constructor arguments, as hex.
    #[arg(long, env = "DATAMARKET_CONSTRUCTOR_ARGS")]
    pub constructor_args: Option<String>,

    /// Number of blocks to wait for, counting the one holding the transaction.
    #[arg(long, env = "DATAMARKET_CONFIRMATIONS", default_value_t = 1)]
    pub confirmations: u64,

    /// Maximum time to wait for confirmation, in seconds.
    #[arg(long, env = "DATAMARKET_WAIT_TIMEOUT", default_value_t = 300)]
    pub wait_timeout: u64,

    /// Deploy the existing artifacts without compiling first.
    #[arg(long, env = "DATAMARKET_NO_COMPILE")]
    pub no_compile: bool,

    /// Dotenv file to write `CONTRACT_ADDRESS` and `CONTRACT_ABI` into.
    #[arg(long, env = "DATAMARKET_ENV_FILE")]
    pub env_file: Option<PathBuf>,
}
