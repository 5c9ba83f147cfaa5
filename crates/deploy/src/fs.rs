//! File system utils.

use std::path::{Path, PathBuf};

use anyhow::Context;

pub struct FsHandler;

impl FsHandler {
    pub fn set_writable(path: &Path) -> anyhow::Result<()> {
        let mut perms = std::fs::metadata(path)
            .with_context(|| format!("Failed to get metadata for {}", path.display()))?
            .permissions();

        perms.set_readonly(false);

        std::fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to set permissions on {}", path.display()))
    }

    /// Create a directory that will be bind-mounted into a container.
    pub fn create_mount_directory(path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Created mount directory");

        Self::set_writable(path)
    }

    /// Collect the files under `dir` whose extension is `extension`, recursively.
    ///
    /// Paths are sorted so that callers get a stable order.
    pub fn files_with_extension(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let read_dir = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory {}", dir.display()))?;

            for entry in read_dir {
                let path = entry
                    .with_context(|| format!("Failed to read entry in {}", dir.display()))?
                    .path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == extension) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_files_with_extension_is_recursive_and_sorted() {
        let temp_dir = TempDir::new("datamarket-fs").unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::write(root.join("Market.sol"), "").unwrap();
        std::fs::write(root.join("lib/Access.sol"), "").unwrap();
        std::fs::write(root.join("README.md"), "").unwrap();

        let files = FsHandler::files_with_extension(root, "sol").unwrap();
        assert_eq!(files, vec![root.join("Market.sol"), root.join("lib/Access.sol")]);
    }
}
