//! In-memory registry backends for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use benchbuild_core::{Container, ContainerId, ContainerImage, Event, Image};

use crate::error::RegistryError;
use crate::registry::{ContainerBackend, ImageStore};

/// Image store backed by a map. Builds always succeed unless the tag was
/// marked with [`FakeImageStore::fail_build`].
#[derive(Default)]
pub struct FakeImageStore {
    images: Mutex<HashMap<String, Image>>,
    failing: HashSet<String>,
    finds: AtomicUsize,
    built: Mutex<Vec<String>>,
    saved: Mutex<Vec<(String, PathBuf)>>,
    loaded: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to seed an existing image.
    pub fn with_image(self, image: Image) -> Self {
        self.images
            .lock()
            .unwrap()
            .insert(image.name.clone(), image);
        self
    }

    /// Builder method to make building `tag` fail.
    pub fn fail_build(mut self, tag: &str) -> Self {
        self.failing.insert(tag.to_string());
        self
    }

    /// Number of lookups that reached the store.
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    /// Stored image by tag.
    pub fn image(&self, tag: &str) -> Option<Image> {
        self.images.lock().unwrap().get(tag).cloned()
    }

    /// Tags built so far, in order.
    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    pub fn saved(&self) -> Vec<(String, PathBuf)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<(String, PathBuf)> {
        self.loaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn find(&self, tag: &str) -> Result<Option<Image>, RegistryError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(self.image(tag))
    }

    async fn create(&self, tag: &str, layers: &ContainerImage) -> Result<Image, RegistryError> {
        let base = layers
            .base()
            .ok_or_else(|| RegistryError::MissingBase(tag.to_string()))?;
        if self.failing.contains(tag) {
            return Err(RegistryError::Io(std::io::Error::other(format!(
                "build of {} failed",
                tag
            ))));
        }

        let mut image = Image::new(tag).with_parent(base);
        image.env = layers.declared_env();
        self.images
            .lock()
            .unwrap()
            .insert(tag.to_string(), image.clone());
        self.built.lock().unwrap().push(tag.to_string());
        Ok(image)
    }

    async fn save(&self, tag: &str, out_path: &Path) -> Result<(), RegistryError> {
        if self.image(tag).is_none() {
            return Err(RegistryError::UnknownImage(tag.to_string()));
        }
        self.saved
            .lock()
            .unwrap()
            .push((tag.to_string(), out_path.to_path_buf()));
        Ok(())
    }

    async fn load(&self, tag: &str, in_path: &Path) -> Result<(), RegistryError> {
        self.images
            .lock()
            .unwrap()
            .insert(tag.to_string(), Image::new(tag));
        self.loaded
            .lock()
            .unwrap()
            .push((tag.to_string(), in_path.to_path_buf()));
        Ok(())
    }
}

/// Container backend that hands out sequential ids. Starts fail for
/// containers marked with [`FakeBackend::fail_start`].
#[derive(Default)]
pub struct FakeBackend {
    next_id: AtomicUsize,
    failing: HashSet<String>,
    created: Mutex<Vec<Container>>,
    started: Mutex<Vec<String>>,
    removed: Mutex<Vec<ContainerId>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to make starting the container `name` fail.
    pub fn fail_start(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Names of created containers, in order.
    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Created container by name, as the backend saw it.
    pub fn container(&self, name: &str) -> Option<Container> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Names of started containers, in order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<ContainerId> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerBackend for FakeBackend {
    async fn find(&self, container_id: &str) -> Result<Option<Container>, RegistryError> {
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.container_id.as_str() == container_id || c.name == container_id)
            .cloned())
    }

    async fn create(&self, image: &Image, name: &str) -> Result<Container, RegistryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let container = Container::new(
            ContainerId::new(format!("container-{}", id)),
            image.clone(),
            name,
        );
        self.created.lock().unwrap().push(container.clone());
        Ok(container)
    }

    async fn start(&self, container: &Container) -> Event {
        self.started.lock().unwrap().push(container.name.clone());
        if self.failing.contains(&container.name) {
            Event::container_start_failed(
                container.name.clone(),
                container.container_id.clone(),
                "exited with code 1",
            )
        } else {
            Event::container_started(container.container_id.clone())
        }
    }

    async fn remove(&self, container_id: &ContainerId) -> Result<(), RegistryError> {
        self.removed.lock().unwrap().push(container_id.clone());
        Ok(())
    }
}
