//! Service errors.

use std::path::PathBuf;

use thiserror::Error;

use benchbuild_core::{CommandKind, CoreError};
use benchbuild_engine::CommandError;

/// Errors raised by the image and container registries.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The image tag does not resolve. Build the image first.
    #[error("Image not found: {0}")]
    UnknownImage(String),

    /// `start` was called for a container this registry never created.
    #[error("Container '{0}' must be created through this registry before it can be started")]
    ContainerNotRegistered(String),

    /// The engine refused to create the container.
    #[error("Failed to create container '{name}' with `{command}`: {reason}")]
    ContainerCreate {
        name: String,
        command: String,
        reason: String,
    },

    /// An image spec without a `From` layer.
    #[error("Image '{0}' has no base layer")]
    MissingBase(String),

    /// Experiment layers that bring their own `From` layer.
    #[error("Experiment image '{0}' must build on its project image, not its own base")]
    ExperimentBase(String),

    /// Engine process failure.
    #[error(transparent)]
    Engine(#[from] CommandError),

    /// The engine printed something we could not parse.
    #[error("Malformed engine output for '{subject}': {source}")]
    Inspect {
        subject: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Returns true for usage errors: the caller broke a precondition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnknownImage(_)
                | Self::ContainerNotRegistered(_)
                | Self::MissingBase(_)
                | Self::ExperimentBase(_)
        )
    }
}

/// Errors raised while dispatching a command.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nobody handles this kind of command.
    #[error("No handler registered for {0}")]
    NoHandler(CommandKind),

    /// A kind may have exactly one handler.
    #[error("A handler for {0} is already registered")]
    DuplicateHandler(CommandKind),

    /// A handler was given a command of another kind.
    #[error("Handler for {expected} received a {actual} command")]
    UnexpectedCommand {
        expected: CommandKind,
        actual: CommandKind,
    },

    /// Registry failure inside the handler.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors loading a JSON file (configuration or catalog).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid entry in '{}': {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: CoreError,
    },
}
