//! Solidity compilation through the `ethereum/solc` Docker image.
//!
//! Sources are fingerprinted (compiler version, optimizer settings, SHA-256 of
//! every file). The fingerprint of the last successful run is kept in
//! `<cache>/solc-cache.json`; when it matches, compilation is skipped.

use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    OptimizerConfig, ToolchainConfig,
    artifact::{ARTIFACT_FORMAT, Artifact, ArtifactStore},
    docker::{DockerImage, DockerRunner, JobConfig},
    fs::FsHandler,
};

/// Docker image shipping the `solc` binary, tagged by compiler version.
pub const SOLC_DOCKER_IMAGE: &str = "ethereum/solc";

/// Name of the compiler cache file inside the cache directory.
pub const CACHE_FILENAME: &str = "solc-cache.json";

const CONTAINER_SOURCES_PATH: &str = "/sources";
const CONTAINER_OUTPUT_PATH: &str = "/output";
const COMBINED_JSON_FILENAME: &str = "combined.json";

/// Everything that influences the compiler output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationFingerprint {
    pub solc_version: String,
    pub optimizer: OptimizerConfig,
    /// SHA-256 of each source file, keyed by its path relative to the sources directory.
    pub sources: BTreeMap<String, String>,
}

impl CompilationFingerprint {
    /// Fingerprint the given source files.
    pub fn compute(
        config: &ToolchainConfig,
        sources_dir: &Path,
        files: &[PathBuf],
    ) -> Result<Self> {
        let mut sources = BTreeMap::new();

        for file in files {
            let content = std::fs::read(file)
                .with_context(|| format!("Failed to read source {}", file.display()))?;
            sources.insert(
                relative_source_path(sources_dir, file)?,
                hex::encode(Sha256::digest(&content)),
            );
        }

        Ok(Self {
            solc_version: config.solidity.clone(),
            optimizer: config.optimizer,
            sources,
        })
    }

    /// SHA-256 of the serialized fingerprint.
    pub fn compute_hash(&self) -> String {
        // BTreeMap keys keep the serialization order stable.
        let json = serde_json::to_string(self)
            .expect("CompilationFingerprint serialization should never fail");
        hex::encode(Sha256::digest(json.as_bytes()))
    }
}

/// Metadata of the last successful compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationCache {
    pub fingerprint_hash: String,
    pub solc_version: String,
    /// Unix timestamp of the compilation.
    pub compiled_at: i64,
    /// Fully qualified names of the artifacts produced.
    pub artifacts: Vec<String>,
}

impl CompilationCache {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize compiler cache")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write compiler cache to {}", path.display()))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read compiler cache from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse compiler cache JSON")
    }
}

/// What a call to [`SolcCompiler::compile`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// No sources directory or no `.sol` file: existing artifacts are used as is.
    NoSources,
    /// Sources are unchanged since the last compilation.
    UpToDate,
    /// The compiler ran and wrote this many artifacts.
    Compiled { artifacts: usize },
}

#[derive(Debug, Deserialize)]
struct CombinedJson {
    contracts: BTreeMap<String, CombinedContract>,
}

#[derive(Debug, Deserialize)]
struct CombinedContract {
    abi: Value,
    bin: String,
    #[serde(rename = "bin-runtime", default)]
    bin_runtime: String,
}

/// Compiles the project sources into Hardhat-style artifacts.
pub struct SolcCompiler<'a> {
    config: &'a ToolchainConfig,
    image: DockerImage,
}

impl<'a> SolcCompiler<'a> {
    pub fn new(config: &'a ToolchainConfig) -> Self {
        Self {
            config,
            image: DockerImage::new(SOLC_DOCKER_IMAGE, config.solidity.clone()),
        }
    }

    /// Use another compiler image (same CLI as `ethereum/solc`).
    pub fn with_image(mut self, image: DockerImage) -> Self {
        self.image = image;
        self
    }

    fn cache_path(&self) -> PathBuf {
        self.config.cache_dir().join(CACHE_FILENAME)
    }

    /// Compile the sources unless the cache shows they are unchanged.
    pub async fn compile(&self, force: bool) -> Result<CompileOutcome> {
        let sources_dir = self.config.sources_dir();

        if !sources_dir.exists() {
            tracing::debug!(sources = %sources_dir.display(), "No sources directory, skipping compilation");
            return Ok(CompileOutcome::NoSources);
        }

        let files = FsHandler::files_with_extension(&sources_dir, "sol")?;
        if files.is_empty() {
            tracing::debug!(sources = %sources_dir.display(), "No Solidity sources, skipping compilation");
            return Ok(CompileOutcome::NoSources);
        }

        let fingerprint = CompilationFingerprint::compute(self.config, &sources_dir, &files)?;
        let fingerprint_hash = fingerprint.compute_hash();
        let store = ArtifactStore::new(self.config.artifacts_dir());
        let previous = CompilationCache::load_from_file(&self.cache_path()).ok();

        if !force
            && let Some(cache) = &previous
            && cache.fingerprint_hash == fingerprint_hash
            && Self::artifacts_present(&store, cache)
        {
            tracing::info!("Nothing to compile, sources unchanged");
            return Ok(CompileOutcome::UpToDate);
        }

        tracing::info!(
            solc = %self.config.solidity,
            files = files.len(),
            "Compiling Solidity sources..."
        );

        let artifacts = self
            .run_solc(&sources_dir, &fingerprint, &fingerprint_hash)
            .await
            .context("Compilation failed")?;

        let mut names = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            store.write(artifact)?;
            names.push(artifact.fully_qualified_name());
        }

        if let Some(previous) = &previous {
            Self::remove_obsolete_artifacts(&store, &previous.artifacts, &names);
        }

        CompilationCache {
            fingerprint_hash,
            solc_version: self.config.solidity.clone(),
            compiled_at: chrono::Utc::now().timestamp(),
            artifacts: names,
        }
        .save_to_file(&self.cache_path())?;

        tracing::info!(artifacts = artifacts.len(), "Compiled successfully");

        Ok(CompileOutcome::Compiled {
            artifacts: artifacts.len(),
        })
    }

    async fn run_solc(
        &self,
        sources_dir: &Path,
        fingerprint: &CompilationFingerprint,
        fingerprint_hash: &str,
    ) -> Result<Vec<Artifact>> {
        let output_dir = self.config.cache_dir().join("solc-output");
        FsHandler::create_mount_directory(&output_dir)?;

        let combined_path = output_dir.join(COMBINED_JSON_FILENAME);
        if combined_path.exists() {
            std::fs::remove_file(&combined_path)
                .with_context(|| format!("Failed to remove stale {}", combined_path.display()))?;
        }

        let sources_dir = sources_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", sources_dir.display()))?;
        let output_dir = output_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", output_dir.display()))?;

        let files: Vec<String> = fingerprint.sources.keys().cloned().collect();
        let job = JobConfig::new(self.image.clone())
            .cmd(self.solc_args(&files))
            .bind(&sources_dir, CONTAINER_SOURCES_PATH, "ro")
            .bind(&output_dir, CONTAINER_OUTPUT_PATH, "rw")
            .working_dir(CONTAINER_SOURCES_PATH)
            .user_from_owner(&output_dir)?;

        let container_name = format!("datamarket-solc-{}", &fingerprint_hash[..12]);
        let runner = DockerRunner::connect()?;
        let output = runner.run_job(&container_name, job).await?;

        if !output.logs.trim().is_empty() {
            tracing::debug!(logs = %output.logs.trim_end(), "solc output");
        }

        read_combined_json(&combined_path, &source_prefix(self.config))
    }

    /// Arguments passed to `solc`, with paths relative to the sources mount.
    pub fn solc_args(&self, files: &[String]) -> Vec<String> {
        let mut args = vec![
            "--combined-json".to_string(),
            "abi,bin,bin-runtime".to_string(),
        ];

        if self.config.optimizer.enabled {
            args.push("--optimize".to_string());
            args.push("--optimize-runs".to_string());
            args.push(self.config.optimizer.runs.to_string());
        }

        args.extend([
            "--output-dir".to_string(),
            CONTAINER_OUTPUT_PATH.to_string(),
            "--overwrite".to_string(),
        ]);
        args.extend(files.iter().cloned());
        args
    }

    fn artifacts_present(store: &ArtifactStore, cache: &CompilationCache) -> bool {
        cache.artifacts.iter().all(|name| {
            name.rsplit_once(':')
                .is_some_and(|(source, contract)| store.artifact_path(source, contract).exists())
        })
    }

    fn remove_obsolete_artifacts(store: &ArtifactStore, previous: &[String], current: &[String]) {
        for name in previous.iter().filter(|name| !current.contains(name)) {
            let Some((source, contract)) = name.rsplit_once(':') else {
                continue;
            };
            let path = store.artifact_path(source, contract);
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(artifact = %name, "Removed obsolete artifact"),
                Err(e) => tracing::trace!(artifact = %name, error = %e, "Obsolete artifact not removed"),
            }
        }
    }
}

/// Convert `solc --combined-json` output into artifacts.
///
/// `source_prefix` is prepended to the source names solc reports, so that
/// `Market.sol` compiled from `contracts/` becomes `contracts/Market.sol`.
pub fn artifacts_from_combined_json(content: &str, source_prefix: &str) -> Result<Vec<Artifact>> {
    let combined: CombinedJson =
        serde_json::from_str(content).context("Failed to parse solc combined JSON output")?;

    combined
        .contracts
        .into_iter()
        .map(|(key, contract)| {
            let (source, contract_name) = key
                .rsplit_once(':')
                .with_context(|| format!("Unexpected contract key '{}' in solc output", key))?;

            let source = source.trim_start_matches("./");
            let source_name = if source_prefix.is_empty() {
                source.to_string()
            } else {
                format!("{}/{}", source_prefix, source)
            };

            // Before solc 0.8.0 the ABI is a JSON document embedded in a string.
            let abi = match contract.abi {
                Value::String(abi) => serde_json::from_str(&abi)
                    .with_context(|| format!("Invalid ABI for {}", key))?,
                abi => abi,
            };

            Ok(Artifact {
                format: ARTIFACT_FORMAT.to_string(),
                contract_name: contract_name.to_string(),
                source_name,
                abi,
                bytecode: format!("0x{}", contract.bin),
                deployed_bytecode: format!("0x{}", contract.bin_runtime),
                link_references: Value::Object(Default::default()),
                deployed_link_references: Value::Object(Default::default()),
            })
        })
        .collect()
}

fn relative_source_path(sources_dir: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(sources_dir).with_context(|| {
        format!(
            "Source {} is outside of {}",
            file.display(),
            sources_dir.display()
        )
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Read the `combined.json` left by a finished solc container.
fn read_combined_json(path: &Path, source_prefix: &str) -> Result<Vec<Artifact>> {
    if !path.exists() {
        anyhow::bail!("solc exited successfully but did not write {}", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    artifacts_from_combined_json(&content, source_prefix)
}

/// The sources directory relative to the project root, `/`-separated.
///
/// A sources directory outside of the project keeps only its last component.
fn source_prefix(config: &ToolchainConfig) -> String {
    let sources = &config.paths.sources;
    let relative = if sources.is_absolute() {
        match sources.strip_prefix(&config.root) {
            Ok(relative) => relative,
            Err(_) => {
                return sources
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
            }
        }
    } else {
        sources.as_path()
    };

    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
