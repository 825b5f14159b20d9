//! Image, container and mount types.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::Event;
use crate::ids::ContainerId;

/// A bind mount applied when a container is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mount {
    /// Path on the host.
    pub source: String,

    /// Path inside the container.
    pub target: String,
}

impl Mount {
    /// Create a new bind mount.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Render as the engine's `--mount` value.
    pub fn to_engine_spec(&self) -> String {
        format!("type=bind,src={},target={}", self.source, self.target)
    }
}

impl FromStr for Mount {
    type Err = CoreError;

    /// Parse `SOURCE:TARGET`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((source, target)) if !source.is_empty() && !target.is_empty() => {
                Ok(Self::new(source, target))
            }
            _ => Err(CoreError::InvalidMount(s.to_string())),
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

/// A named container image.
///
/// The name is the only identity: two values with the same name are the
/// same image, whatever their mounts or environment say.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    /// Unique tag, e.g. `lulesh/benchbuild:HEAD`.
    pub name: String,

    /// Engine image id, if known.
    pub digest: Option<String>,

    /// Base image this one was derived from.
    pub parent: Option<String>,

    /// Bind mounts applied to every container created from this image.
    pub mounts: Vec<Mount>,

    /// Declared environment.
    pub env: BTreeMap<String, String>,
}

impl Image {
    /// Create a new Image with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: None,
            parent: None,
            mounts: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Builder method to set the digest.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Builder method to set the parent reference.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Returns a copy of this image with one more mount appended.
    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Returns a copy of this image with an environment variable set.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Look up a declared environment variable.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Image {}

impl Hash for Image {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A created container: a named, stateful instance of an image.
#[derive(Debug, Clone)]
pub struct Container {
    /// Identifier assigned by the engine.
    pub container_id: ContainerId,

    /// Image the container was created from.
    pub image: Image,

    /// Where the container filesystem is mounted on the host, once mounted.
    pub mount_point: Option<PathBuf>,

    /// Registry key, chosen by the caller.
    pub name: String,

    events: Vec<Event>,
}

impl Container {
    /// Create a new Container.
    pub fn new(container_id: ContainerId, image: Image, name: impl Into<String>) -> Self {
        Self {
            container_id,
            image,
            mount_point: None,
            name: name.into(),
            events: Vec::new(),
        }
    }

    /// Append a lifecycle event.
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns true if the most recent start attempt failed.
    pub fn start_failed(&self) -> bool {
        self.events
            .iter()
            .rev()
            .find(|e| e.is_start_outcome())
            .is_some_and(|e| matches!(e, Event::ContainerStartFailed { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_parse() {
        let mount: Mount = "/tmp/build:/app".parse().unwrap();
        assert_eq!(mount, Mount::new("/tmp/build", "/app"));
        assert_eq!(mount.to_engine_spec(), "type=bind,src=/tmp/build,target=/app");
    }

    #[test]
    fn test_mount_parse_rejects_missing_target() {
        assert!(matches!(
            "/tmp/build".parse::<Mount>(),
            Err(CoreError::InvalidMount(_))
        ));
        assert!("/tmp/build:".parse::<Mount>().is_err());
    }

    #[test]
    fn test_image_identity_is_name() {
        let a = Image::new("p1/group:HEAD").with_env("CC", "clang");
        let b = Image::new("p1/group:HEAD").with_mount(Mount::new("/a", "/b"));
        assert_eq!(a, b);
        assert_ne!(a, Image::new("p2/group:HEAD"));
    }

    #[test]
    fn test_with_mount_keeps_original() {
        let base = Image::new("img");
        let mounted = base.clone().with_mount(Mount::new("/a", "/b"));
        assert!(base.mounts.is_empty());
        assert_eq!(mounted.mounts.len(), 1);
    }

    #[test]
    fn test_container_start_failed() {
        let mut container = Container::new(ContainerId::new("c1"), Image::new("img"), "box");
        assert!(!container.start_failed());

        container.record(Event::container_start_failed("box", ContainerId::new("c1"), "boom"));
        assert!(container.start_failed());

        container.record(Event::container_started(ContainerId::new("c1")));
        assert!(!container.start_failed());
        assert_eq!(container.events().len(), 2);
    }
}
