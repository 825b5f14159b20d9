//! Core domain errors.

use thiserror::Error;

/// Core domain errors for benchbuild.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Mount specification could not be parsed.
    #[error("Invalid mount specification '{0}', expected SOURCE:TARGET")]
    InvalidMount(String),

    /// Image tag is empty or malformed.
    #[error("Invalid image tag: {0}")]
    InvalidTag(String),

    /// Experiment layers always derive from the project image.
    #[error("Experiment '{0}' must not declare its own base image")]
    ExperimentBase(String),
}
