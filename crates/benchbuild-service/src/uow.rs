//! Unit of work: the registries one command dispatch operates on.

use std::sync::Arc;

use tracing::debug;

use benchbuild_core::Event;
use benchbuild_engine::Podman;

use crate::adapters::{PodmanBackend, PodmanImageStore};
use crate::config::Config;
use crate::registry::{ContainerBackend, ContainerRegistry, ImageRegistry, ImageStore};

/// Bundles a container registry (which owns its image registry) for
/// exactly one dispatch.
///
/// Engine side effects are never undone: `rollback` only discards the
/// in-process bookkeeping.
pub struct UnitOfWork {
    pub registry: ContainerRegistry,
    committed: Vec<Event>,
}

impl UnitOfWork {
    pub fn new(registry: ContainerRegistry) -> Self {
        Self {
            registry,
            committed: Vec::new(),
        }
    }

    /// Publish the events recorded since the last commit.
    pub fn commit(&mut self) {
        let events = self.registry.take_pending_events();
        debug!(events = events.len(), "Committing unit of work");
        self.committed.extend(events);
    }

    /// Discard cached state and uncommitted events.
    pub fn rollback(&mut self) {
        debug!("Rolling back unit of work");
        self.registry.reset();
    }

    /// Drain committed events.
    pub fn collect_new_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.committed)
    }
}

/// Hands out a fresh [`UnitOfWork`] per command over shared backends.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    images: Arc<dyn ImageStore>,
    containers: Arc<dyn ContainerBackend>,
}

impl UnitOfWorkFactory {
    pub fn new(images: Arc<dyn ImageStore>, containers: Arc<dyn ContainerBackend>) -> Self {
        Self { images, containers }
    }

    /// Backends that drive the `podman` engine described by `config`.
    pub fn podman(config: &Config) -> Self {
        let podman = Podman::new(config.engine.clone());
        let images = PodmanImageStore::new(podman.clone(), &config.build_dir);
        let containers = PodmanBackend::new(podman, config.mounts.clone());
        Self::new(Arc::new(images), Arc::new(containers))
    }

    /// Start a new unit of work with empty caches.
    pub fn begin(&self) -> UnitOfWork {
        let images = ImageRegistry::new(Arc::clone(&self.images));
        UnitOfWork::new(ContainerRegistry::new(Arc::clone(&self.containers), images))
    }
}
