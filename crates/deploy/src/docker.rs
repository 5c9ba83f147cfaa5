//! Docker client for running one-shot toolchain containers.

use std::path::Path;

use anyhow::{Context, Result};
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, WaitContainerOptions,
    },
    image::CreateImageOptions,
    secret::HostConfig,
};
use derive_more::Deref;
use futures::StreamExt;

/// A Docker image reference with image name and tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DockerImage {
    /// The image name (e.g., "ethereum/solc").
    pub image: String,
    /// The image tag (e.g., "0.8.0").
    pub tag: String,
}

impl DockerImage {
    /// Create a new DockerImage with the given image name and tag.
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Get the full image reference (image:tag).
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl std::fmt::Display for DockerImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.image, self.tag)
    }
}

/// Configuration of a container that runs to completion.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// The Docker image to use.
    pub image: DockerImage,
    /// The command to run in the container.
    pub cmd: Vec<String>,
    /// Volume binds (host:container:mode format).
    pub binds: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// User (uid:gid) to run as.
    pub user: Option<String>,
}

impl JobConfig {
    /// Create a new job config with the given image.
    pub fn new(image: DockerImage) -> Self {
        Self {
            image,
            cmd: Vec::new(),
            binds: Vec::new(),
            working_dir: None,
            user: None,
        }
    }

    /// Set the command.
    pub fn cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    /// Add a volume bind.
    pub fn bind(mut self, host_path: &Path, container_path: &str, mode: &str) -> Self {
        self.binds.push(format!(
            "{}:{}:{}",
            host_path.display(),
            container_path,
            mode
        ));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run as the owner of `path`, so that files written by the container
    /// belong to the current user.
    pub fn user_from_owner(mut self, path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("Failed to get metadata for {}", path.display()))?;
            self.user = Some(format!("{}:{}", metadata.uid(), metadata.gid()));
        }
        #[cfg(not(unix))]
        let _ = path;
        Ok(self)
    }
}

/// Output of a finished job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub exit_code: i64,
    pub logs: String,
}

/// Docker client wrapper.
#[derive(Deref)]
pub struct DockerRunner {
    #[deref]
    docker: Docker,
}

impl DockerRunner {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker. Is Docker running?")?;
        Ok(Self { docker })
    }

    pub async fn pull_image(&self, image: &DockerImage) -> Result<()> {
        let full_image = image.full_name();

        if self.docker.inspect_image(&full_image).await.is_ok() {
            tracing::debug!(image = %full_image, "Image already available locally, skipping pull");
            return Ok(());
        }

        tracing::info!(image = %full_image, "Pulling image...");

        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image.image.clone(),
                tag: image.tag.clone(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            let info = result
                .with_context(|| format!("Failed to pull image '{}'", full_image))?;
            if let Some(status) = info.status {
                tracing::trace!(status, "Image pull");
            }
        }

        Ok(())
    }

    /// Create a container, run it to completion, collect its logs and remove it.
    ///
    /// Fails with the container output when the exit code is not zero.
    pub async fn run_job(&self, container_name: &str, job: JobConfig) -> Result<JobOutput> {
        self.pull_image(&job.image).await?;

        // A container left behind by an interrupted run would block the name.
        self.remove_container(container_name).await;

        let host_config = HostConfig {
            binds: (!job.binds.is_empty()).then_some(job.binds),
            ..Default::default()
        };

        let config = Config {
            image: Some(job.image.full_name()),
            cmd: Some(job.cmd),
            working_dir: job.working_dir,
            user: job.user,
            host_config: Some(host_config),
            ..Default::default()
        };

        tracing::trace!(container_name, "Creating container");
        let container_id = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name,
                    ..Default::default()
                }),
                config,
            )
            .await
            .context("Failed to create container")?
            .id;

        let result = self.start_and_wait(&container_id).await;
        let logs = self.collect_logs(&container_id).await;
        self.remove_container(&container_id).await;

        let exit_code = result?;
        tracing::debug!(container_name, exit_code, "Container completed");

        if exit_code != 0 {
            anyhow::bail!(
                "Container {} exited with non-zero code {}:\n{}",
                container_name,
                exit_code,
                logs.trim_end()
            );
        }

        Ok(JobOutput { exit_code, logs })
    }

    async fn start_and_wait(&self, container_id: &str) -> Result<i64> {
        self.docker
            .start_container::<String>(container_id, None)
            .await
            .context("Failed to start container")?;

        let mut wait_stream = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e).context("Failed to wait for container"),
            None => anyhow::bail!("Container wait stream ended without response"),
        }
    }

    async fn collect_logs(&self, container_id: &str) -> String {
        let mut stream = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                ..Default::default()
            }),
        );

        let mut logs = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => logs.push_str(&output.to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading container logs");
                    break;
                }
            }
        }
        logs
    }

    async fn remove_container(&self, container: &str) {
        // Ignore errors if already removed.
        self.docker
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .ok();
    }
}
