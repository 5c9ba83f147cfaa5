//! datamarket is a CLI tool to compile and deploy the DataMarketplace contract.

mod cli;

use std::{io::Write, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, DeployArgs};
use datamarket_deploy::{
    CompileOutcome, DeployerBuilder, DeploymentResult, SolcCompiler, ToolchainConfig,
    parse_constructor_args,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Stdout only carries the deployment result.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists, use --force to overwrite it",
                    cli.config.display()
                );
            }
            ToolchainConfig::default().save_to_file(&cli.config)?;
        }

        Command::Compile { force } => {
            let config = ToolchainConfig::load(&cli.config)?;
            match SolcCompiler::new(&config).compile(force).await? {
                CompileOutcome::NoSources => tracing::warn!(
                    sources = %config.sources_dir().display(),
                    "No Solidity sources found"
                ),
                CompileOutcome::UpToDate | CompileOutcome::Compiled { .. } => {}
            }
        }

        Command::Deploy(args) => {
            let config = ToolchainConfig::load(&cli.config)?;
            report(deploy(config, args).await, &mut std::io::stdout().lock())?;
        }
    }

    Ok(())
}

/// Write the single result line, or nothing when the deployment failed.
fn report(outcome: Result<DeploymentResult>, out: &mut impl Write) -> Result<()> {
    let result = outcome.context("Deployment failed")?;
    writeln!(out, "{}", result).context("Failed to write deployment result")
}

async fn deploy(config: ToolchainConfig, args: DeployArgs) -> Result<DeploymentResult> {
    let mut builder = DeployerBuilder::new(config)
        .contract(args.contract)
        .confirmations(args.confirmations)
        .wait_timeout(Duration::from_secs(args.wait_timeout))
        .compile(!args.no_compile);

    if let Some(network) = args.network {
        builder = builder.network(network);
    }

    if let Some(constructor_args) = args.constructor_args {
        builder = builder.constructor_args(parse_constructor_args(&constructor_args)?);
    }

    if let Some(env_file) = args.env_file {
        builder = builder.env_file(env_file);
    }

    builder.build()?.deploy().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{Address, B256};

    fn result() -> DeploymentResult {
        DeploymentResult {
            contract_name: "DataMarketplace".to_string(),
            address: Address::repeat_byte(0xab),
            transaction_hash: B256::repeat_byte(0x01),
            block_number: 1,
            deployer: Address::repeat_byte(0x90),
            network: "localhost".to_string(),
            chain_id: 1337,
            gas_used: 21_000,
        }
    }

    #[test]
    fn test_report_writes_one_line_on_success() {
        let mut out = Vec::new();
        report(Ok(result()), &mut out).unwrap();

        let stdout = String::from_utf8(out).unwrap();
        assert_eq!(stdout.lines().count(), 1);
        assert_eq!(
            stdout,
            format!("DataMarketplace deployed to: {}\n", Address::repeat_byte(0xab))
        );
    }

    #[test]
    fn test_report_writes_nothing_on_failure() {
        let mut out = Vec::new();
        let err = report(Err(anyhow::anyhow!("connection refused")), &mut out).unwrap_err();

        assert!(out.is_empty());
        assert_eq!(err.to_string(), "Deployment failed");
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[tokio::test]
    async fn test_deploy_with_invalid_constructor_args_fails() {
        let cli = Cli::try_parse_from([
            "datamarket",
            "deploy",
            "--no-compile",
            "--constructor-args",
            "0xzz",
        ])
        .unwrap();
        let Command::Deploy(args) = cli.command else {
            panic!("expected the deploy command");
        };

        let mut out = Vec::new();
        let outcome = deploy(ToolchainConfig::default(), args).await;
        assert!(report(outcome, &mut out).is_err());
        assert!(out.is_empty());
    }
}
