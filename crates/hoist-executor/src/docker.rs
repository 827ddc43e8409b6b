//! Container lifecycle wrapper.
//!
//! [`ContainerRuntime`] is the seam between the migration workflows and the
//! container engine. [`DockerCli`] drives the `docker` CLI; commands run
//! under `/bin/sh -c` inside the container so that a descriptor's
//! `Command` survives a round trip through `docker inspect`.

use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use hoist_core::ContainerSpec;

use crate::command::run_command;
use crate::error::{ExecResult, ExecutionError};

/// Checkpoint name used inside a checkpoint directory.
pub const CHECKPOINT_ID: &str = "hoist";

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container. Returns the container id.
    async fn run(&self, spec: &ContainerSpec) -> ExecResult<String>;

    /// Create a container without starting it.
    async fn create(&self, spec: &ContainerSpec) -> ExecResult<()>;

    /// Descriptor of an existing container.
    async fn inspect(&self, name: &str) -> ExecResult<ContainerSpec>;

    /// Write a checkpoint of a running container into `dir`.
    async fn checkpoint(&self, name: &str, dir: &Path) -> ExecResult<()>;

    /// Start a created container from the checkpoint in `dir`.
    async fn restore(&self, name: &str, dir: &Path) -> ExecResult<()>;

    async fn logs(&self, name: &str) -> ExecResult<String>;

    async fn stop(&self, name: &str) -> ExecResult<()>;

    async fn remove(&self, name: &str) -> ExecResult<()>;
}

/// `docker` CLI runtime.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn docker<I, S>(&self, args: I) -> ExecResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_command(&self.bin, args).await
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// `--name NAME IMAGE [/bin/sh -c COMMAND]`
fn container_args(spec: &ContainerSpec) -> Vec<&str> {
    let mut args = vec!["--name", spec.name.as_str(), spec.image.as_str()];
    if !spec.command.is_empty() {
        args.extend(["/bin/sh", "-c", spec.command.as_str()]);
    }
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    cmd: Option<Vec<String>>,
}

/// Build a descriptor from `docker inspect --format '{{json .Config}}'`.
fn spec_from_inspect(name: &str, output: &str) -> ExecResult<ContainerSpec> {
    let config: InspectConfig =
        serde_json::from_str(output.trim()).map_err(|e| ExecutionError::Inspect {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    let command = match config.cmd.as_deref() {
        Some([shell, flag, script]) if shell == "/bin/sh" && flag == "-c" => script.clone(),
        Some(parts) => parts.join(" "),
        None => String::new(),
    };
    Ok(ContainerSpec::new(name, config.image, command))
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, spec: &ContainerSpec) -> ExecResult<String> {
        let mut args = vec!["run", "-d"];
        args.extend(container_args(spec));
        let id = self.docker(args).await?.trim().to_string();
        info!(container = %spec.name, image = %spec.image, %id, "container started");
        Ok(id)
    }

    async fn create(&self, spec: &ContainerSpec) -> ExecResult<()> {
        let mut args = vec!["create"];
        args.extend(container_args(spec));
        self.docker(args).await?;
        Ok(())
    }

    async fn inspect(&self, name: &str) -> ExecResult<ContainerSpec> {
        let output = self
            .docker(["inspect", "--format", "{{json .Config}}", name])
            .await?;
        spec_from_inspect(name, &output)
    }

    async fn checkpoint(&self, name: &str, dir: &Path) -> ExecResult<()> {
        self.docker([
            OsStr::new("checkpoint"),
            OsStr::new("create"),
            OsStr::new("--checkpoint-dir"),
            dir.as_os_str(),
            OsStr::new(name),
            OsStr::new(CHECKPOINT_ID),
        ])
        .await?;
        info!(container = %name, dir = %dir.display(), "checkpoint written");
        Ok(())
    }

    async fn restore(&self, name: &str, dir: &Path) -> ExecResult<()> {
        self.docker([
            OsStr::new("start"),
            OsStr::new("--checkpoint"),
            OsStr::new(CHECKPOINT_ID),
            OsStr::new("--checkpoint-dir"),
            dir.as_os_str(),
            OsStr::new(name),
        ])
        .await?;
        info!(container = %name, "container restored from checkpoint");
        Ok(())
    }

    async fn logs(&self, name: &str) -> ExecResult<String> {
        self.docker(["logs", name]).await
    }

    async fn stop(&self, name: &str) -> ExecResult<()> {
        self.docker(["stop", name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> ExecResult<()> {
        self.docker(["rm", name]).await?;
        Ok(())
    }
}
