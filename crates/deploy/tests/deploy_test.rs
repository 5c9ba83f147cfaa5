//! Integration tests for datamarket-deploy.
//!
//! Deployments run against an in-memory chain implementing [`ChainClient`], so
//! neither Docker nor a node is needed. Compilation is disabled and artifacts
//! are written directly into a temporary project.
//! Run with: cargo test --test deploy_test

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;
use datamarket_deploy::{
    Artifact, ArtifactStore, ChainClient, DeployerBuilder, DeploymentRecord, NetworkConfig,
    ToolchainConfig, TransactionReceipt, TransactionRequest, artifact::ARTIFACT_FORMAT,
};
use tempdir::TempDir;

const CHAIN_ID: u64 = 1337;

fn address(n: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    Address::from(bytes)
}

fn hash(n: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    B256::from(bytes)
}

#[derive(Default)]
struct ChainState {
    block: u64,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<B256, TransactionReceipt>,
    /// Receipt polls answered with `None` before the receipt shows up.
    pending_polls: u32,
}

/// An in-memory dev chain that mines every transaction in its own block.
#[derive(Clone)]
struct MockChain {
    chain_id: u64,
    accounts: Vec<Address>,
    revert: bool,
    /// Latency of every receipt query.
    receipt_delay: Duration,
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    fn new() -> Self {
        Self {
            chain_id: CHAIN_ID,
            accounts: vec![address(0x90)],
            revert: false,
            receipt_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(ChainState::default())),
        }
    }

    fn with_pending_polls(self, polls: u32) -> Self {
        self.state.lock().unwrap().pending_polls = polls;
        self
    }

    fn sent(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts.clone())
    }

    async fn block_number(&self) -> Result<u64> {
        // Every query sees one more block, as with an automining node under load.
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        Ok(state.block)
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256> {
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        state.sent.push(tx.clone());

        let n = state.sent.len() as u64;
        let tx_hash = hash(n);
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: state.block,
            contract_address: (!self.revert).then(|| address(0x1000 + n)),
            status: Some(if self.revert { 0 } else { 1 }),
            gas_used: 21_000 + tx.data.len() as u64,
        };
        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        if !self.receipt_delay.is_zero() {
            tokio::time::sleep(self.receipt_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(None);
        }
        Ok(state.receipts.get(&tx_hash).cloned())
    }
}

/// A temporary project holding a compiled DataMarketplace artifact.
struct TestProject {
    _dir: TempDir,
    config: ToolchainConfig,
}

impl TestProject {
    fn new() -> Self {
        let dir = TempDir::new("datamarket-project").unwrap();
        let config = ToolchainConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };

        ArtifactStore::new(config.artifacts_dir())
            .write(&Artifact {
                format: ARTIFACT_FORMAT.to_string(),
                contract_name: "DataMarketplace".to_string(),
                source_name: "contracts/DataMarketplace.sol".to_string(),
                abi: serde_json::json!([{"type": "constructor", "inputs": []}]),
                bytecode: "0x6080604052".to_string(),
                deployed_bytecode: "0x6080".to_string(),
                link_references: serde_json::json!({}),
                deployed_link_references: serde_json::json!({}),
            })
            .unwrap();

        Self { _dir: dir, config }
    }

    fn builder(&self) -> DeployerBuilder {
        DeployerBuilder::new(self.config.clone())
            .compile(false)
            .wait_timeout(Duration::from_secs(10))
    }
}

fn is_address_line(line: &str) -> bool {
    let Some(address) = line.strip_prefix("DataMarketplace deployed to: 0x") else {
        return false;
    };
    address.len() == 40 && address.chars().all(|c| c.is_ascii_hexdigit())
}

#[tokio::test]
async fn test_deploy_prints_address() -> Result<()> {
    let project = TestProject::new();
    let chain = MockChain::new();

    let result = project.builder().build()?.deploy_with(&chain).await?;

    assert!(is_address_line(&result.to_string()), "{}", result);
    assert_eq!(result.chain_id, CHAIN_ID);
    assert_eq!(result.deployer, address(0x90));
    assert_eq!(result.network, "localhost");

    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, address(0x90));
    assert_eq!(sent[0].data, Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]));

    Ok(())
}

#[tokio::test]
async fn test_two_deployments_have_distinct_addresses() -> Result<()> {
    let project = TestProject::new();
    let chain = MockChain::new();
    let deployer = project.builder().build()?;

    let first = deployer.deploy_with(&chain).await?;
    let second = deployer.deploy_with(&chain).await?;

    assert_ne!(first.address, second.address);
    assert_ne!(first.transaction_hash, second.transaction_hash);

    // The record always describes the latest deployment.
    let record = DeploymentRecord::load_from_file(&DeploymentRecord::path(
        &project.config.deployments_dir(),
        "localhost",
        "DataMarketplace",
    ))?;
    assert_eq!(record.result, second);

    Ok(())
}

#[tokio::test]
async fn test_deploy_waits_for_receipt_and_confirmations() -> Result<()> {
    let project = TestProject::new();
    let chain = MockChain::new().with_pending_polls(2);

    let result = project
        .builder()
        .confirmations(3)
        .build()?
        .deploy_with(&chain)
        .await?;

    assert!(chain.state.lock().unwrap().block >= result.block_number + 2);
    Ok(())
}

#[tokio::test]
async fn test_deploy_appends_constructor_args() -> Result<()> {
    let project = TestProject::new();
    let chain = MockChain::new();

    project
        .builder()
        .constructor_args(datamarket_deploy::parse_constructor_args("0xbeef")?)
        .build()?
        .deploy_with(&chain)
        .await?;

    assert!(chain.sent()[0].data.ends_with(&[0xbe, 0xef]));
    Ok(())
}

#[tokio::test]
async fn test_reverted_deployment_fails() {
    let project = TestProject::new();
    let chain = MockChain {
        revert: true,
        ..MockChain::new()
    };

    let err = project
        .builder()
        .build()
        .unwrap()
        .deploy_with(&chain)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("reverted"), "{:#}", err);

    // Nothing is recorded for a failed deployment.
    assert!(!project.config.deployments_dir().exists());
}

#[tokio::test]
async fn test_chain_id_mismatch_fails_before_sending() {
    let mut project = TestProject::new();
    let network = project.config.networks.get_mut("localhost").unwrap();
    network.chain_id = Some(5);

    let chain = MockChain::new();
    let err = project
        .builder()
        .build()
        .unwrap()
        .deploy_with(&chain)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("chain id"), "{:#}", err);
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn test_no_accounts_fails() {
    let project = TestProject::new();
    let chain = MockChain {
        accounts: vec![],
        ..MockChain::new()
    };

    let result = project.builder().build().unwrap().deploy_with(&chain).await;
    assert!(result.is_err());
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn test_configured_sender_is_used() -> Result<()> {
    let mut project = TestProject::new();
    let network = project.config.networks.get_mut("localhost").unwrap();
    network.from = Some(address(0x42));

    let chain = MockChain::new();
    let result = project.builder().build()?.deploy_with(&chain).await?;

    assert_eq!(result.deployer, address(0x42));
    assert_eq!(chain.sent()[0].from, address(0x42));
    Ok(())
}

#[tokio::test]
async fn test_receipt_timeout_names_transaction() {
    let project = TestProject::new();
    let chain = MockChain::new().with_pending_polls(u32::MAX);

    let err = project
        .builder()
        .wait_timeout(Duration::from_millis(600))
        .build()
        .unwrap()
        .deploy_with(&chain)
        .await
        .unwrap_err();

    assert!(err.to_string().contains(&hash(1).to_string()), "{:#}", err);
}

#[tokio::test]
async fn test_slow_receipt_queries_count_against_wait_timeout() {
    let project = TestProject::new();
    let chain = MockChain {
        receipt_delay: Duration::from_secs(30),
        ..MockChain::new()
    };

    let started = std::time::Instant::now();
    let err = project
        .builder()
        .wait_timeout(Duration::from_millis(300))
        .build()
        .unwrap()
        .deploy_with(&chain)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.to_string().contains("not mined"), "{:#}", err);
}

#[tokio::test]
async fn test_unreachable_confirmation_count_fails_without_overflow() {
    let project = TestProject::new();
    let chain = MockChain::new();
    chain.state.lock().unwrap().block = 10;

    let err = project
        .builder()
        .confirmations(u64::MAX)
        .build()
        .unwrap()
        .deploy_with(&chain)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("confirmations"), "{:#}", err);
}

#[tokio::test]
async fn test_unwritable_record_keeps_the_deployment() -> Result<()> {
    let project = TestProject::new();
    // A file where the deployments directory should be.
    std::fs::write(project.config.deployments_dir(), "")?;

    let chain = MockChain::new();
    let result = project.builder().build()?.deploy_with(&chain).await?;

    assert!(is_address_line(&result.to_string()), "{}", result);
    assert_eq!(chain.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unwritable_env_file_keeps_the_deployment() -> Result<()> {
    let project = TestProject::new();
    // A directory cannot be written as a dotenv file.
    std::fs::create_dir_all(project.config.root.join(".env"))?;

    let chain = MockChain::new();
    let result = project
        .builder()
        .env_file(".env")
        .build()?
        .deploy_with(&chain)
        .await?;

    assert!(is_address_line(&result.to_string()), "{}", result);
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_fails() {
    let project = TestProject::new();
    let chain = MockChain::new();

    let result = project
        .builder()
        .contract("Unknown")
        .build()
        .unwrap()
        .deploy_with(&chain)
        .await;

    assert!(result.is_err());
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn test_env_file_export() -> Result<()> {
    let project = TestProject::new();
    let env_path = project.config.root.join(".env");
    std::fs::write(&env_path, "GANACHE_URL=http://ganache:8545\n")?;

    let chain = MockChain::new();
    let result = project
        .builder()
        .env_file(".env")
        .build()?
        .deploy_with(&chain)
        .await?;

    let content = std::fs::read_to_string(&env_path)?;
    assert!(content.starts_with("GANACHE_URL=http://ganache:8545\n"));
    assert!(content.contains(&format!("CONTRACT_ADDRESS={}", result.address)));
    assert!(content.contains("CONTRACT_ABI='[{"));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_fails() {
    let mut project = TestProject::new();
    project.config.networks.insert(
        "localhost".to_string(),
        NetworkConfig::new("http://127.0.0.1:1").with_timeout(2_000),
    );

    let err = project.builder().build().unwrap().deploy().await.unwrap_err();
    assert!(format!("{:#}", err).contains("localhost"), "{:#}", err);
}

#[test]
fn test_zero_timeout_is_rejected_before_any_request() {
    let mut project = TestProject::new();
    project.config.networks.insert(
        "localhost".to_string(),
        NetworkConfig::new("http://127.0.0.1:8545").with_timeout(0),
    );

    assert!(project.builder().build().is_err());
}
