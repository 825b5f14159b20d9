//! `podman`-backed image store and container backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use benchbuild_core::{sanitize_tag, Container, ContainerId, ContainerImage, Event, Image, Mount};
use benchbuild_engine::Podman;

use crate::error::RegistryError;
use crate::registry::{ContainerBackend, ImageStore};

/// Subset of `podman image inspect --format json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageInspect {
    id: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    config: Option<ImageInspectConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageInspectConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
}

/// Subset of `podman container inspect --format json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    name: String,
    #[serde(default)]
    image_name: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
}

/// Parse inspect output. `podman` prints a JSON array with one entry per
/// argument; we only ever pass one.
fn parse_inspect<T: DeserializeOwned>(subject: &str, raw: &str) -> Result<Option<T>, RegistryError> {
    let mut entries: Vec<T> = serde_json::from_str(raw).map_err(|source| RegistryError::Inspect {
        subject: subject.to_string(),
        source,
    })?;
    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(entries.swap_remove(0)))
}

/// Split `KEY=VALUE` entries. Entries without `=` are ignored.
fn parse_env(entries: &[String]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Container id printed by `create`. With `--replace` the engine may print
/// the id of the replaced container first, so the last word wins.
fn created_id(stdout: &str) -> Option<&str> {
    stdout.split_whitespace().last()
}

/// Images in the engine's local store.
///
/// New images are built from a Containerfile rendered into
/// `{build_dir}/containerfiles`, with `build_dir` as the build context.
pub struct PodmanImageStore {
    podman: Podman,
    build_dir: PathBuf,
}

impl PodmanImageStore {
    pub fn new(podman: Podman, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            podman,
            build_dir: build_dir.into(),
        }
    }

    fn containerfile_path(&self, tag: &str) -> PathBuf {
        self.build_dir
            .join("containerfiles")
            .join(format!("{}.Containerfile", sanitize_tag(tag)))
    }

    async fn ensure_base(&self, base: &str) -> Result<(), RegistryError> {
        if self.podman.image_exists(base).await? {
            return Ok(());
        }
        info!(base = %base, "Pulling base image");
        self.podman.pull(base).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageStore for PodmanImageStore {
    async fn find(&self, tag: &str) -> Result<Option<Image>, RegistryError> {
        if !self.podman.image_exists(tag).await? {
            debug!(tag = %tag, "Image not in local store");
            return Ok(None);
        }

        let raw = self.podman.image_inspect(tag).await?;
        let Some(inspect) = parse_inspect::<ImageInspect>(tag, &raw)? else {
            return Ok(None);
        };

        let mut image = Image::new(tag).with_digest(inspect.id);
        if let Some(parent) = inspect.parent.filter(|p| !p.is_empty()) {
            image = image.with_parent(parent);
        }
        image.env = inspect
            .config
            .and_then(|config| config.env)
            .map(|entries| parse_env(&entries))
            .unwrap_or_default();
        debug!(tag = %tag, digest = ?image.digest, "Resolved image");
        Ok(Some(image))
    }

    async fn create(&self, tag: &str, layers: &ContainerImage) -> Result<Image, RegistryError> {
        let base = layers
            .base()
            .ok_or_else(|| RegistryError::MissingBase(tag.to_string()))?;
        self.ensure_base(base).await?;

        let containerfile = self.containerfile_path(tag);
        if let Some(dir) = containerfile.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&containerfile, layers.to_containerfile()).await?;

        info!(tag = %tag, base = %base, "Building image");
        self.podman
            .build(tag, &containerfile, &self.build_dir)
            .await?;

        let mut image = Image::new(tag).with_parent(base);
        image.env = layers.declared_env();
        Ok(image)
    }

    async fn save(&self, tag: &str, out_path: &Path) -> Result<(), RegistryError> {
        if let Some(dir) = out_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        self.podman.save(tag, out_path).await?;
        info!(tag = %tag, path = %out_path.display(), "Exported image");
        Ok(())
    }

    async fn load(&self, tag: &str, in_path: &Path) -> Result<(), RegistryError> {
        self.podman.load(in_path, tag).await?;
        info!(tag = %tag, path = %in_path.display(), "Imported image");
        Ok(())
    }
}

/// Containers managed through `podman`.
pub struct PodmanBackend {
    podman: Podman,
    mounts: Vec<Mount>,
}

impl PodmanBackend {
    /// Create a backend. `mounts` are applied to every container after the
    /// image's own mounts.
    pub fn new(podman: Podman, mounts: Vec<Mount>) -> Self {
        Self { podman, mounts }
    }
}

#[async_trait]
impl ContainerBackend for PodmanBackend {
    async fn find(&self, container_id: &str) -> Result<Option<Container>, RegistryError> {
        if !self.podman.container_exists(container_id).await? {
            return Ok(None);
        }

        let raw = self.podman.container_inspect(container_id).await?;
        let Some(inspect) = parse_inspect::<ContainerInspect>(container_id, &raw)? else {
            return Ok(None);
        };

        let image = Image::new(inspect.image_name.unwrap_or_default());
        let mut container = Container::new(ContainerId::new(inspect.id), image, inspect.name);
        container.mount_point = inspect
            .mountpoint
            .filter(|m| !m.is_empty())
            .map(PathBuf::from);
        Ok(Some(container))
    }

    async fn create(&self, image: &Image, name: &str) -> Result<Container, RegistryError> {
        let mounts: Vec<String> = image
            .mounts
            .iter()
            .chain(self.mounts.iter())
            .map(Mount::to_engine_spec)
            .collect();

        let stdout = self
            .podman
            .create(name, &image.name, &mounts)
            .await
            .map_err(|e| RegistryError::ContainerCreate {
                name: name.to_string(),
                command: e.command_line(),
                reason: match e.output() {
                    "" => e.to_string(),
                    output => output.to_string(),
                },
            })?;

        let container_id =
            created_id(&stdout).ok_or_else(|| RegistryError::ContainerCreate {
                name: name.to_string(),
                command: self
                    .podman
                    .create_command(name, &image.name, &mounts)
                    .to_string(),
                reason: "engine printed no container id".to_string(),
            })?;

        Ok(Container::new(
            ContainerId::new(container_id),
            image.clone(),
            name,
        ))
    }

    async fn start(&self, container: &Container) -> Event {
        match self.podman.start(container.container_id.as_str()).await {
            Ok(_) => Event::container_started(container.container_id.clone()),
            Err(e) => {
                warn!(
                    name = %container.name,
                    container_id = %container.container_id,
                    error = %e,
                    "Container start failed"
                );
                Event::container_start_failed(
                    container.name.clone(),
                    container.container_id.clone(),
                    e.to_string(),
                )
            }
        }
    }

    async fn remove(&self, container_id: &ContainerId) -> Result<(), RegistryError> {
        self.podman.rm(container_id.as_str()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use benchbuild_engine::testing::ScriptedRunner;
    use benchbuild_engine::EngineConfig;

    fn podman(runner: Arc<ScriptedRunner>) -> Podman {
        Podman::with_runner(EngineConfig::default(), runner)
    }

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("benchbuild-{}-{}", label, std::process::id()))
    }

    #[test]
    fn test_created_id() {
        assert_eq!(created_id("oldid\nnewid\n"), Some("newid"));
        assert_eq!(created_id("oldid newid"), Some("newid"));
        assert_eq!(created_id("  abc  \n\n"), Some("abc"));
        assert_eq!(created_id("\n \n"), None);
    }

    #[test]
    fn test_parse_env() {
        let env = parse_env(&[
            "PATH=/usr/bin".to_string(),
            "CFLAGS=-O2 -g".to_string(),
            "BROKEN".to_string(),
        ]);
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(env.get("CFLAGS").map(String::as_str), Some("-O2 -g"));
        assert_eq!(env.len(), 2);
    }

    #[tokio::test]
    async fn test_find_image_parses_inspect() {
        let inspect = r#"[{
            "Id": "sha256:1234",
            "Digest": "sha256:abcd",
            "Parent": "",
            "Config": {"Env": ["CC=clang", "PATH=/usr/bin"]}
        }]"#;
        let runner = Arc::new(ScriptedRunner::new().push_ok("").push_ok(inspect));
        let store = PodmanImageStore::new(podman(runner.clone()), "build");

        let image = store.find("p1/group:HEAD").await.unwrap().unwrap();

        assert_eq!(image.name, "p1/group:HEAD");
        assert_eq!(image.digest.as_deref(), Some("sha256:1234"));
        assert_eq!(image.parent, None);
        assert_eq!(image.env_var("CC"), Some("clang"));
        assert_eq!(
            runner.calls()[1].argv,
            ["podman", "image", "inspect", "--format", "json", "p1/group:HEAD"]
        );
    }

    #[tokio::test]
    async fn test_find_image_absent() {
        let runner = Arc::new(ScriptedRunner::new().push_exit(1, ""));
        let store = PodmanImageStore::new(podman(runner.clone()), "build");

        assert!(store.find("nope:latest").await.unwrap().is_none());
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_find_image_malformed_inspect() {
        let runner = Arc::new(ScriptedRunner::new().push_ok("").push_ok("not json"));
        let store = PodmanImageStore::new(podman(runner), "build");

        let err = store.find("p1/group:HEAD").await.unwrap_err();
        assert!(matches!(err, RegistryError::Inspect { ref subject, .. } if subject == "p1/group:HEAD"));
    }

    #[tokio::test]
    async fn test_create_image_pulls_missing_base_then_builds() {
        let build_dir = temp_dir("store-build");
        let runner = Arc::new(
            ScriptedRunner::new()
                .push_exit(1, "")
                .push_ok("")
                .push_ok(""),
        );
        let store = PodmanImageStore::new(podman(runner.clone()), &build_dir);
        let layers = ContainerImage::new()
            .from_("alpine:3.17")
            .env("CC", "clang")
            .run("make", vec!["-j4".to_string()]);

        let image = store.create("p1/group:HEAD", &layers).await.unwrap();

        assert_eq!(image.parent.as_deref(), Some("alpine:3.17"));
        assert_eq!(image.env_var("CC"), Some("clang"));

        let calls = runner.calls();
        assert_eq!(calls[0].argv, ["podman", "image", "exists", "alpine:3.17"]);
        assert_eq!(calls[1].argv, ["podman", "pull", "alpine:3.17"]);
        assert_eq!(calls[2].argv[..4], ["podman", "build", "--tag", "p1/group:HEAD"]);
        assert!(calls[2].tee);

        let containerfile = build_dir
            .join("containerfiles")
            .join("p1_group_HEAD.Containerfile");
        let rendered = tokio::fs::read_to_string(&containerfile).await.unwrap();
        assert_eq!(rendered, layers.to_containerfile());

        tokio::fs::remove_dir_all(&build_dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_image_requires_base() {
        let runner = Arc::new(ScriptedRunner::new());
        let store = PodmanImageStore::new(podman(runner.clone()), "build");
        let layers = ContainerImage::new().run("true", Vec::new());

        let err = store.create("p1/group:HEAD", &layers).await.unwrap_err();

        assert!(matches!(err, RegistryError::MissingBase(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_container_find_parses_inspect() {
        let inspect = r#"[{
            "Id": "abc",
            "Name": "build-p1",
            "ImageName": "p1/group:HEAD",
            "Mountpoint": "/var/lib/containers/abc/merged"
        }]"#;
        let runner = Arc::new(ScriptedRunner::new().push_ok("").push_ok(inspect));
        let backend = PodmanBackend::new(podman(runner), Vec::new());

        let container = backend.find("abc").await.unwrap().unwrap();

        assert_eq!(container.name, "build-p1");
        assert_eq!(container.image.name, "p1/group:HEAD");
        assert_eq!(
            container.mount_point,
            Some(PathBuf::from("/var/lib/containers/abc/merged"))
        );
    }

    #[tokio::test]
    async fn test_container_create_without_id_fails() {
        let runner = Arc::new(ScriptedRunner::new().push_ok("\n"));
        let backend = PodmanBackend::new(podman(runner), Vec::new());

        let err = backend
            .create(&Image::new("p1/group:HEAD"), "build-p1")
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::ContainerCreate { .. }));
    }
}
