//! Image registry: cached, read-mostly access to images.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use benchbuild_core::{ContainerImage, Image, Mount};

use super::ImageStore;
use crate::error::RegistryError;

/// Resolves image tags, caching every image it has seen.
///
/// Images do not change once built, so a cached entry is never refreshed.
/// Temporary mounts live here, not on the image: they are applied to the
/// value handed out by [`find`](Self::find) and vanish with the registry.
pub struct ImageRegistry {
    store: Arc<dyn ImageStore>,
    images: HashMap<String, Image>,
    temporary_mounts: HashMap<String, Vec<Mount>>,
}

impl ImageRegistry {
    /// Create a registry over a backing store.
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self {
            store,
            images: HashMap::new(),
            temporary_mounts: HashMap::new(),
        }
    }

    /// Resolve `tag`, from the cache if possible.
    pub async fn find(&mut self, tag: &str) -> Result<Option<Image>, RegistryError> {
        let image = match self.images.get(tag) {
            Some(image) => image.clone(),
            None => match self.store.find(tag).await? {
                Some(image) => {
                    debug!(tag = %tag, "Caching image");
                    self.images.insert(tag.to_string(), image.clone());
                    image
                }
                None => return Ok(None),
            },
        };
        Ok(Some(self.with_temporary_mounts(image)))
    }

    /// Read a declared environment variable of the image.
    pub async fn env(&mut self, tag: &str, name: &str) -> Result<Option<String>, RegistryError> {
        Ok(self
            .find(tag)
            .await?
            .and_then(|image| image.env_var(name).map(str::to_string)))
    }

    /// Mount `source` at `target` in every container created from `tag`
    /// through this registry.
    pub fn mount(&mut self, tag: &str, source: impl Into<String>, target: impl Into<String>) {
        self.temporary_mounts
            .entry(tag.to_string())
            .or_default()
            .push(Mount::new(source, target));
    }

    /// Build `tag` from `layers` and cache the result.
    pub async fn create(
        &mut self,
        tag: &str,
        layers: &ContainerImage,
    ) -> Result<Image, RegistryError> {
        let image = self.store.create(tag, layers).await?;
        self.images.insert(tag.to_string(), image.clone());
        Ok(self.with_temporary_mounts(image))
    }

    /// Write `tag` to an archive at `out_path`.
    pub async fn save(&self, tag: &str, out_path: &Path) -> Result<(), RegistryError> {
        self.store.save(tag, out_path).await
    }

    /// Load an archive as `tag`. Any cached entry for `tag` is dropped.
    pub async fn load(&mut self, tag: &str, in_path: &Path) -> Result<(), RegistryError> {
        self.store.load(tag, in_path).await?;
        self.images.remove(tag);
        Ok(())
    }

    /// Returns true if `tag` is in the cache.
    pub fn is_cached(&self, tag: &str) -> bool {
        self.images.contains_key(tag)
    }

    /// Forget every cached image and temporary mount.
    pub fn clear(&mut self) {
        self.images.clear();
        self.temporary_mounts.clear();
    }

    fn with_temporary_mounts(&self, image: Image) -> Image {
        match self.temporary_mounts.get(&image.name) {
            Some(mounts) => mounts
                .iter()
                .cloned()
                .fold(image, |image, mount| image.with_mount(mount)),
            None => image,
        }
    }
}
