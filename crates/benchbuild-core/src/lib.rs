//! benchbuild Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - The container engine
//! - Process execution
//! - Runtime specifics
//!
//! All types here describe images, containers and the commands that
//! produce them.

pub mod command;
pub mod error;
pub mod event;
pub mod ids;
pub mod layers;
pub mod model;
pub mod status;
pub mod tag;

// Re-export commonly used types
pub use command::{
    Command, CommandKind, CreateExperimentImage, CreateProjectImage, ExportImage, ImportImage,
    RemoveContainer, RunProjectContainer,
};
pub use error::CoreError;
pub use event::{Event, EventKind};
pub use ids::{ContainerId, DispatchId};
pub use layers::{ContainerImage, Layer};
pub use model::{Container, Image, Mount};
pub use status::CommandStatus;
pub use tag::{
    check_name_component, check_tag_component, make_image_name, make_version_tag, sanitize_tag,
};
