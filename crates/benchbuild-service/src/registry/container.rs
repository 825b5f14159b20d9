//! Container registry: creates, starts and tracks containers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use benchbuild_core::{Container, ContainerId, Event, Image};

use super::{ContainerBackend, ImageRegistry};
use crate::error::RegistryError;

/// Tracks the containers created during one unit of work.
///
/// Containers are keyed by their caller-assigned name. Every event recorded
/// on a container is also queued here until the unit of work collects it.
pub struct ContainerRegistry {
    backend: Arc<dyn ContainerBackend>,
    images: ImageRegistry,
    containers: HashMap<String, Container>,
    pending_events: Vec<Event>,
}

impl ContainerRegistry {
    /// Create a registry over a backend and an image registry.
    pub fn new(backend: Arc<dyn ContainerBackend>, images: ImageRegistry) -> Self {
        Self {
            backend,
            images,
            containers: HashMap::new(),
            pending_events: Vec::new(),
        }
    }

    /// The image registry containers are created from.
    pub fn images(&mut self) -> &mut ImageRegistry {
        &mut self.images
    }

    /// Resolve an image tag.
    pub async fn find_image(&mut self, tag: &str) -> Result<Option<Image>, RegistryError> {
        self.images.find(tag).await
    }

    /// Read a declared environment variable of an image.
    pub async fn env(&mut self, tag: &str, name: &str) -> Result<Option<String>, RegistryError> {
        self.images.env(tag, name).await
    }

    /// Mount `source` at `target` in containers created from `tag`.
    pub fn mount(&mut self, tag: &str, source: impl Into<String>, target: impl Into<String>) {
        self.images.mount(tag, source, target);
    }

    /// Find a container by engine id or name, from the cache if possible.
    pub async fn find(&mut self, container_id: &str) -> Result<Option<Container>, RegistryError> {
        if let Some(container) = self.lookup(container_id) {
            return Ok(Some(container.clone()));
        }

        match self.backend.find(container_id).await? {
            Some(container) => {
                debug!(container_id = %container_id, name = %container.name, "Caching container");
                self.containers
                    .insert(container.name.clone(), container.clone());
                Ok(Some(container))
            }
            None => Ok(None),
        }
    }

    /// Create a container named `name` from `image_tag`.
    ///
    /// The image must already resolve; building it is the caller's job.
    /// A container previously registered under `name` is replaced.
    pub async fn create(
        &mut self,
        image_tag: &str,
        name: &str,
    ) -> Result<Container, RegistryError> {
        let image = self
            .find_image(image_tag)
            .await?
            .ok_or_else(|| RegistryError::UnknownImage(image_tag.to_string()))?;

        let mut container = self.backend.create(&image, name).await?;

        let event = Event::container_created(name, container.container_id.clone());
        container.record(event.clone());
        self.pending_events.push(event);

        info!(
            name = %name,
            container_id = %container.container_id,
            image = %image.name,
            "Created container"
        );
        self.containers.insert(name.to_string(), container.clone());
        Ok(container)
    }

    /// Start a container created by this registry and record the outcome.
    ///
    /// A failed start is recorded as an event and is not an error.
    pub async fn start(&mut self, container: &mut Container) -> Result<(), RegistryError> {
        if !self.containers.contains_key(&container.name) {
            return Err(RegistryError::ContainerNotRegistered(
                container.name.clone(),
            ));
        }

        let event = self.backend.start(container).await;
        info!(
            name = %container.name,
            container_id = %container.container_id,
            outcome = ?event.kind(),
            "Container finished"
        );

        container.record(event.clone());
        if let Some(cached) = self.containers.get_mut(&container.name) {
            cached.record(event.clone());
        }
        self.pending_events.push(event);
        Ok(())
    }

    /// Remove a container from the engine and from the cache.
    pub async fn remove(&mut self, container_id: &ContainerId) -> Result<(), RegistryError> {
        self.backend.remove(container_id).await?;
        self.containers
            .retain(|_, container| &container.container_id != container_id);
        info!(container_id = %container_id, "Removed container");
        Ok(())
    }

    /// A registered container by name.
    pub fn get(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    /// Number of registered containers.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Returns true if no container is registered.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Drain events recorded since the last call.
    pub fn take_pending_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending_events)
    }

    /// Drop all bookkeeping: cached containers, images and pending events.
    pub fn reset(&mut self) {
        self.containers.clear();
        self.pending_events.clear();
        self.images.clear();
    }

    fn lookup(&self, container_id: &str) -> Option<&Container> {
        self.containers.get(container_id).or_else(|| {
            self.containers
                .values()
                .find(|c| c.container_id.as_str() == container_id)
        })
    }
}
