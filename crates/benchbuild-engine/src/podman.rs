//! Argument construction for the `podman` engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CommandError;
use crate::runner::{CommandRunner, CommandSpec, ProcessRunner};

/// Exit code `podman * exists` uses for "not found".
const NOT_FOUND_EXIT_CODE: i32 = 1;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable, resolved through PATH unless absolute.
    pub binary: String,

    /// Storage root (`--root`).
    pub root: Option<PathBuf>,

    /// State directory (`--runroot`).
    pub runroot: Option<PathBuf>,

    /// Storage driver (`--storage-driver`).
    pub storage_driver: Option<String>,

    /// Deadline for a single engine call, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "podman".to_string(),
            root: None,
            runroot: None,
            storage_driver: None,
            timeout_secs: None,
        }
    }
}

/// Handle to the `podman` engine.
///
/// Every method is one subprocess. Output is returned as captured; parsing
/// it is the caller's business.
#[derive(Clone)]
pub struct Podman {
    runner: Arc<dyn CommandRunner>,
    config: EngineConfig,
}

impl Podman {
    /// Create a handle that runs real subprocesses.
    pub fn new(config: EngineConfig) -> Self {
        let mut runner = ProcessRunner::new();
        if let Some(secs) = config.timeout_secs {
            runner = runner.with_timeout(Duration::from_secs(secs));
        }
        Self::with_runner(config, Arc::new(runner))
    }

    /// Create a handle with a custom runner.
    pub fn with_runner(config: EngineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, config }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Base command: the binary plus storage options.
    fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.binary);
        if let Some(root) = &self.config.root {
            spec = spec.arg("--root").arg(root.display().to_string());
        }
        if let Some(runroot) = &self.config.runroot {
            spec = spec.arg("--runroot").arg(runroot.display().to_string());
        }
        if let Some(driver) = &self.config.storage_driver {
            spec = spec.arg("--storage-driver").arg(driver);
        }
        spec
    }

    /// `create --replace [--mount M]... --name NAME IMAGE`.
    pub fn create_command(&self, name: &str, image: &str, mounts: &[String]) -> CommandSpec {
        let mut spec = self.command().args(["create", "--replace"]);
        for mount in mounts {
            spec = spec.arg("--mount").arg(mount);
        }
        spec.arg("--name").arg(name).arg(image)
    }

    /// Create (but do not start) a container. Returns raw stdout.
    pub async fn create(
        &self,
        name: &str,
        image: &str,
        mounts: &[String],
    ) -> Result<String, CommandError> {
        let spec = self.create_command(name, image, mounts);
        self.runner.run(&spec).await
    }

    /// Start a container attached to the console.
    pub async fn start(&self, container_id: &str) -> Result<String, CommandError> {
        let spec = self
            .command()
            .args(["container", "start", "-ai", container_id]);
        self.runner.run_tee(&spec).await
    }

    /// Remove a container.
    pub async fn rm(&self, container_id: &str) -> Result<(), CommandError> {
        let spec = self.command().args(["rm", container_id]);
        self.runner.run(&spec).await.map(|_| ())
    }

    /// Write `image` to an archive at `out_path`, replacing any existing file.
    pub async fn save(&self, image: &str, out_path: &Path) -> Result<(), CommandError> {
        let spec = self
            .command()
            .args(["save", "-o"])
            .arg(out_path.display().to_string())
            .arg(image);

        match tokio::fs::remove_file(out_path).await {
            Ok(()) => debug!(path = %out_path.display(), "Removed stale image archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CommandError::Io {
                    argv: spec.argv(),
                    source,
                })
            }
        }

        self.runner.run(&spec).await.map(|_| ())
    }

    /// Load an archive into the engine's image store.
    pub async fn load(&self, in_path: &Path, image_name: &str) -> Result<(), CommandError> {
        let spec = self
            .command()
            .args(["load", "-i"])
            .arg(in_path.display().to_string())
            .arg(image_name);
        self.runner.run(&spec).await.map(|_| ())
    }

    /// Returns true if `tag` is in the local image store.
    pub async fn image_exists(&self, tag: &str) -> Result<bool, CommandError> {
        let spec = self.command().args(["image", "exists", tag]);
        exists(self.runner.run(&spec).await)
    }

    /// `image inspect --format json TAG`. Returns raw JSON.
    pub async fn image_inspect(&self, tag: &str) -> Result<String, CommandError> {
        let spec = self
            .command()
            .args(["image", "inspect", "--format", "json", tag]);
        self.runner.run(&spec).await
    }

    /// Pull `tag` from its registry.
    pub async fn pull(&self, tag: &str) -> Result<(), CommandError> {
        let spec = self.command().args(["pull", tag]);
        self.runner.run_tee(&spec).await.map(|_| ())
    }

    /// Build `tag` from a Containerfile.
    pub async fn build(
        &self,
        tag: &str,
        containerfile: &Path,
        context: &Path,
    ) -> Result<(), CommandError> {
        let spec = self
            .command()
            .args(["build", "--tag", tag, "--file"])
            .arg(containerfile.display().to_string())
            .arg(context.display().to_string());
        self.runner.run_tee(&spec).await.map(|_| ())
    }

    /// Returns true if a container with this id or name exists.
    pub async fn container_exists(&self, container_id: &str) -> Result<bool, CommandError> {
        let spec = self.command().args(["container", "exists", container_id]);
        exists(self.runner.run(&spec).await)
    }

    /// `container inspect --format json ID`. Returns raw JSON.
    pub async fn container_inspect(&self, container_id: &str) -> Result<String, CommandError> {
        let spec = self
            .command()
            .args(["container", "inspect", "--format", "json", container_id]);
        self.runner.run(&spec).await
    }
}

fn exists(result: Result<String, CommandError>) -> Result<bool, CommandError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.exit_code() == Some(NOT_FOUND_EXIT_CODE) => Ok(false),
        Err(e) => Err(e),
    }
}
