//! OCI engine invocation for benchbuild
//!
//! This crate wraps the external container engine (`podman`). Every engine
//! operation is a separate subprocess; its stdout is captured and a non-zero
//! exit becomes a [`CommandError`] carrying the argument vector and the
//! captured output. Nothing here retries.
//!
//! # Example
//!
//! ```rust,no_run
//! use benchbuild_engine::{EngineConfig, Podman};
//!
//! async fn exists() -> Result<bool, benchbuild_engine::CommandError> {
//!     let podman = Podman::new(EngineConfig::default());
//!     podman.image_exists("docker.io/alpine:3.17").await
//! }
//! ```

mod error;
mod podman;
mod runner;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use error::CommandError;
pub use podman::{EngineConfig, Podman};
pub use runner::{CommandRunner, CommandSpec, ProcessRunner};
