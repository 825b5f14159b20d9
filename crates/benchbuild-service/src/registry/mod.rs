//! Image and container registries.
//!
//! The registries own the in-process caches and the precondition checks.
//! Everything engine-specific sits behind [`ImageStore`] and
//! [`ContainerBackend`], so another engine only has to implement those two
//! traits.

mod container;
mod image;

use std::path::Path;

use async_trait::async_trait;

use benchbuild_core::{Container, ContainerId, ContainerImage, Event, Image};

use crate::error::RegistryError;

pub use container::ContainerRegistry;
pub use image::ImageRegistry;

/// Backing store of images: the engine's local image list.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Resolve `tag`. A missing image is `Ok(None)`, not an error.
    async fn find(&self, tag: &str) -> Result<Option<Image>, RegistryError>;

    /// Build `tag` from declarative layers.
    async fn create(&self, tag: &str, layers: &ContainerImage) -> Result<Image, RegistryError>;

    /// Write `tag` to an archive.
    async fn save(&self, tag: &str, out_path: &Path) -> Result<(), RegistryError>;

    /// Load an archive as `tag`.
    async fn load(&self, tag: &str, in_path: &Path) -> Result<(), RegistryError>;
}

/// Engine-specific container operations.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Look up an existing container by id or name.
    async fn find(&self, container_id: &str) -> Result<Option<Container>, RegistryError>;

    /// Create a container named `name` from `image`, replacing any
    /// container of the same name.
    async fn create(&self, image: &Image, name: &str) -> Result<Container, RegistryError>;

    /// Start the container and wait for it. The outcome is an event, not
    /// an error: a failing container is a normal result.
    async fn start(&self, container: &Container) -> Event;

    /// Remove a container.
    async fn remove(&self, container_id: &ContainerId) -> Result<(), RegistryError>;
}
