//! Commands: immutable, declarative intent handed to the message bus.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::ContainerId;
use crate::layers::ContainerImage;

/// Build the image of a project variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProjectImage {
    /// Destination tag.
    pub name: String,
    /// Layers of the project image, starting with its base.
    pub layers: ContainerImage,
}

/// Build an experiment image on top of a project image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateExperimentImage {
    /// Tag of the project image to derive from.
    pub base: String,
    /// Destination tag.
    pub name: String,
    /// Layers added on top of `base`.
    pub layers: ContainerImage,
}

/// Run a one-shot container from an existing image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProjectContainer {
    /// Image to instantiate.
    pub image: String,
    /// Container name.
    pub name: String,
    /// Host directory mounted into the container, if any.
    pub build_dir: Option<PathBuf>,
}

/// Write an image archive to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportImage {
    pub image: String,
    pub out_path: PathBuf,
}

/// Load an image archive into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportImage {
    pub image: String,
    pub in_path: PathBuf,
}

/// Remove a container from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveContainer {
    pub container_id: ContainerId,
}

/// Every command the message bus knows how to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateProjectImage(CreateProjectImage),
    CreateExperimentImage(CreateExperimentImage),
    RunProjectContainer(RunProjectContainer),
    ExportImage(ExportImage),
    ImportImage(ImportImage),
    RemoveContainer(RemoveContainer),
}

impl Command {
    /// Kind of this command, the message bus dispatch key.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateProjectImage(_) => CommandKind::CreateProjectImage,
            Self::CreateExperimentImage(_) => CommandKind::CreateExperimentImage,
            Self::RunProjectContainer(_) => CommandKind::RunProjectContainer,
            Self::ExportImage(_) => CommandKind::ExportImage,
            Self::ImportImage(_) => CommandKind::ImportImage,
            Self::RemoveContainer(_) => CommandKind::RemoveContainer,
        }
    }
}

impl From<CreateProjectImage> for Command {
    fn from(cmd: CreateProjectImage) -> Self {
        Self::CreateProjectImage(cmd)
    }
}

impl From<CreateExperimentImage> for Command {
    fn from(cmd: CreateExperimentImage) -> Self {
        Self::CreateExperimentImage(cmd)
    }
}

impl From<RunProjectContainer> for Command {
    fn from(cmd: RunProjectContainer) -> Self {
        Self::RunProjectContainer(cmd)
    }
}

impl From<ExportImage> for Command {
    fn from(cmd: ExportImage) -> Self {
        Self::ExportImage(cmd)
    }
}

impl From<ImportImage> for Command {
    fn from(cmd: ImportImage) -> Self {
        Self::ImportImage(cmd)
    }
}

impl From<RemoveContainer> for Command {
    fn from(cmd: RemoveContainer) -> Self {
        Self::RemoveContainer(cmd)
    }
}

/// Dispatch key of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    CreateProjectImage,
    CreateExperimentImage,
    RunProjectContainer,
    ExportImage,
    ImportImage,
    RemoveContainer,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateProjectImage => "create_project_image",
            Self::CreateExperimentImage => "create_experiment_image",
            Self::RunProjectContainer => "run_project_container",
            Self::ExportImage => "export_image",
            Self::ImportImage => "import_image",
            Self::RemoveContainer => "remove_container",
        };
        f.write_str(name)
    }
}
