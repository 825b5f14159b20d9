//! benchbuild image orchestration.
//!
//! This crate turns a catalog of projects and experiments into container
//! images. Every operation is a [`Command`](benchbuild_core::Command)
//! dispatched through the [`MessageBus`] against a fresh [`UnitOfWork`],
//! whose registries talk to the engine through the adapters in
//! [`adapters`].

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod entrypoints;
pub mod error;
pub mod handlers;
pub mod messagebus;
pub mod registry;
pub mod uow;

#[cfg(test)]
mod fakes;

pub use catalog::{Catalog, Experiment, Project, ProjectVariant};
pub use config::Config;
pub use entrypoints::{Orchestrator, Selection, EXIT_NO_SELECTION};
pub use error::{DispatchError, LoadError, RegistryError};
pub use handlers::bootstrap;
pub use messagebus::{CommandHandler, MessageBus};
pub use registry::{ContainerBackend, ContainerRegistry, ImageRegistry, ImageStore};
pub use uow::{UnitOfWork, UnitOfWorkFactory};
