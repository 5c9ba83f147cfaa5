//! Compiled contract artifacts, stored in the Hardhat layout:
//! `<artifacts>/<sourceName>/<ContractName>.json`.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format tag written into every artifact.
pub const ARTIFACT_FORMAT: &str = "hh-sol-artifact-1";

/// Directory holding compiler build information, never scanned for artifacts.
const BUILD_INFO_DIR: &str = "build-info";

/// Compiled bytecode and interface of a single contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "_format")]
    pub format: String,
    pub contract_name: String,
    pub source_name: String,
    pub abi: Value,
    /// Creation code, `0x`-prefixed. May contain unlinked library placeholders.
    pub bytecode: String,
    pub deployed_bytecode: String,
    #[serde(default)]
    pub link_references: Value,
    #[serde(default)]
    pub deployed_link_references: Value,
}

impl Artifact {
    /// `<sourceName>:<contractName>`.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Creation code followed by the already ABI-encoded constructor arguments.
    pub fn creation_code(&self, constructor_args: &[u8]) -> Result<Bytes> {
        let code = self.bytecode.trim_start_matches("0x");

        if code.is_empty() {
            anyhow::bail!(
                "{} has no bytecode: abstract contracts and interfaces cannot be deployed",
                self.fully_qualified_name()
            );
        }

        if code.contains("__") {
            anyhow::bail!(
                "{} references libraries that are not linked",
                self.fully_qualified_name()
            );
        }

        let mut data = hex::decode(code)
            .with_context(|| format!("Invalid bytecode in {}", self.fully_qualified_name()))?;
        data.extend_from_slice(constructor_args);

        Ok(Bytes::from(data))
    }

    /// Load an artifact from its JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))
    }
}

/// An artifact file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub fully_qualified_name: String,
    pub contract_name: String,
    pub path: PathBuf,
}

/// Lookup of artifacts by contract name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `source_name:contract_name`.
    pub fn artifact_path(&self, source_name: &str, contract_name: &str) -> PathBuf {
        self.root
            .join(source_name)
            .join(format!("{}.json", contract_name))
    }

    /// Write an artifact to its place in the tree.
    pub fn write(&self, artifact: &Artifact) -> Result<PathBuf> {
        let path = self.artifact_path(&artifact.source_name, &artifact.contract_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(artifact).context("Failed to serialize artifact")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;

        tracing::trace!(path = %path.display(), "Artifact written");
        Ok(path)
    }

    /// List every artifact in the tree, sorted by fully qualified name.
    pub fn entries(&self) -> Result<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();
        if self.root.exists() {
            self.collect(&self.root, &mut entries)?;
        }
        entries.sort_by(|a, b| a.fully_qualified_name.cmp(&b.fully_qualified_name));
        Ok(entries)
    }

    fn collect(&self, dir: &Path, entries: &mut Vec<ArtifactEntry>) -> Result<()> {
        let read_dir = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;

        for entry in read_dir {
            let path = entry.context("Failed to read artifacts directory entry")?.path();

            if path.is_dir() {
                if dir == self.root && path.file_name().is_some_and(|n| n == BUILD_INFO_DIR) {
                    continue;
                }
                self.collect(&path, entries)?;
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                continue;
            }

            // Artifacts always live under their source file directory.
            let Some(source_name) = path
                .parent()
                .and_then(|p| p.strip_prefix(&self.root).ok())
                .filter(|p| !p.as_os_str().is_empty())
            else {
                continue;
            };

            let contract_name = file_name.trim_end_matches(".json").to_string();
            let source_name = source_name
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            entries.push(ArtifactEntry {
                fully_qualified_name: format!("{}:{}", source_name, contract_name),
                contract_name,
                path,
            });
        }

        Ok(())
    }

    /// Find an artifact by bare contract name or `source.sol:Name`.
    ///
    /// A bare name must match exactly one artifact.
    pub fn find(&self, name: &str) -> Result<Artifact> {
        if let Some((source_name, contract_name)) = name.rsplit_once(':') {
            let path = self.artifact_path(source_name, contract_name);
            if !path.exists() {
                anyhow::bail!(
                    "Artifact for contract '{}' not found at {}",
                    name,
                    path.display()
                );
            }
            return Artifact::load_from_file(&path);
        }

        let matches: Vec<ArtifactEntry> = self
            .entries()?
            .into_iter()
            .filter(|entry| entry.contract_name == name)
            .collect();

        match matches.as_slice() {
            [] => anyhow::bail!(
                "Artifact for contract '{}' not found in {}. Did you compile the sources?",
                name,
                self.root.display()
            ),
            [entry] => {
                tracing::debug!(
                    contract = name,
                    artifact = %entry.path.display(),
                    "Artifact found"
                );
                Artifact::load_from_file(&entry.path)
            }
            many => anyhow::bail!(
                "Multiple artifacts for contract '{}', use a fully qualified name: {}",
                name,
                many.iter()
                    .map(|e| e.fully_qualified_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn artifact(source_name: &str, contract_name: &str, bytecode: &str) -> Artifact {
        Artifact {
            format: ARTIFACT_FORMAT.to_string(),
            contract_name: contract_name.to_string(),
            source_name: source_name.to_string(),
            abi: serde_json::json!([]),
            bytecode: bytecode.to_string(),
            deployed_bytecode: "0x".to_string(),
            link_references: serde_json::json!({}),
            deployed_link_references: serde_json::json!({}),
        }
    }

    #[test]
    fn test_creation_code_appends_constructor_args() {
        let artifact = artifact("contracts/A.sol", "A", "0x6080");
        let code = artifact.creation_code(&[0xde, 0xad]).unwrap();
        assert_eq!(code.as_ref(), &[0x60, 0x80, 0xde, 0xad]);
    }

    #[test]
    fn test_creation_code_rejects_abstract_and_unlinked() {
        let abstract_contract = artifact("contracts/I.sol", "I", "0x");
        assert!(abstract_contract.creation_code(&[]).is_err());

        let unlinked = artifact(
            "contracts/B.sol",
            "B",
            "0x6080__$b1fd2c4cbd8b2a3e3e1b1f1c1d1e1f1a1b$__6040",
        );
        let err = unlinked.creation_code(&[]).unwrap_err().to_string();
        assert!(err.contains("not linked"));
    }

    #[test]
    fn test_find_by_name_and_qualified_name() {
        let temp_dir = TempDir::new("datamarket-artifacts").unwrap();
        let store = ArtifactStore::new(temp_dir.path());

        store
            .write(&artifact("contracts/DataMarketplace.sol", "DataMarketplace", "0x6080"))
            .unwrap();
        store
            .write(&artifact("contracts/DataMarketplace.sol", "Ownable", "0x6001"))
            .unwrap();
        std::fs::write(
            store
                .artifact_path("contracts/DataMarketplace.sol", "DataMarketplace")
                .with_extension("dbg.json"),
            "{}",
        )
        .unwrap();
        std::fs::create_dir_all(temp_dir.path().join("build-info")).unwrap();
        std::fs::write(temp_dir.path().join("build-info/abc.json"), "{}").unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].fully_qualified_name,
            "contracts/DataMarketplace.sol:DataMarketplace"
        );

        let found = store.find("DataMarketplace").unwrap();
        assert_eq!(found.bytecode, "0x6080");

        let qualified = store.find("contracts/DataMarketplace.sol:Ownable").unwrap();
        assert_eq!(qualified.contract_name, "Ownable");
    }

    #[test]
    fn test_find_missing_and_ambiguous() {
        let temp_dir = TempDir::new("datamarket-artifacts").unwrap();
        let store = ArtifactStore::new(temp_dir.path());

        let err = store.find("DataMarketplace").unwrap_err().to_string();
        assert!(err.contains("not found"));

        store.write(&artifact("contracts/a/Token.sol", "Token", "0x01")).unwrap();
        store.write(&artifact("contracts/b/Token.sol", "Token", "0x02")).unwrap();

        let err = store.find("Token").unwrap_err().to_string();
        assert!(err.contains("contracts/a/Token.sol:Token"));
        assert!(err.contains("contracts/b/Token.sol:Token"));

        assert!(store.find("contracts/c/Token.sol:Token").is_err());
    }
}
