//! datamarket-deploy - Build and deployment library for the DataMarketplace contract.
//!
//! This crate compiles the project's Solidity sources with a dockerized `solc`,
//! deploys a compiled contract to a configured network over JSON-RPC and keeps
//! a record of each deployment.

mod builder;
pub use builder::{DEFAULT_CONTRACT, DeployerBuilder, parse_constructor_args};

mod deployer;
pub use deployer::Deployer;

pub mod artifact;
pub mod chain;
pub mod compiler;
pub mod config;
pub mod deployment;
pub mod docker;
pub mod factory;
mod fs;
pub mod rpc;

pub use artifact::{Artifact, ArtifactStore};
pub use chain::{ChainClient, TransactionReceipt, TransactionRequest};
pub use compiler::{CompileOutcome, SolcCompiler};
pub use config::{CONFIG_FILENAME, NetworkConfig, OptimizerConfig, PathsConfig, ToolchainConfig};
pub use deployment::{DeploymentRecord, DeploymentResult};
pub use docker::DockerImage;
pub use factory::{ConfirmationOptions, ContractFactory, PendingDeployment};
pub use rpc::RpcClient;
