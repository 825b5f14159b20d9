//! Engine adapters for the registry seams.

mod podman;

pub use podman::{PodmanBackend, PodmanImageStore};
