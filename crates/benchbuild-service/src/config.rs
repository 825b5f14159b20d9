//! Orchestration configuration.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use benchbuild_core::Mount;
use benchbuild_engine::EngineConfig;

use crate::error::LoadError;

/// Orchestration configuration.
///
/// Every field has a default; a JSON file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container engine settings.
    pub engine: EngineConfig,

    /// Bind mounts applied to every container, after the image's own mounts.
    pub mounts: Vec<Mount>,

    /// Build context for images and host side of container build mounts.
    pub build_dir: PathBuf,

    /// Where image archives are written to and read from.
    pub export_dir: PathBuf,

    /// Project and experiment catalog.
    pub catalog: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            mounts: Vec::new(),
            build_dir: PathBuf::from("build"),
            export_dir: PathBuf::from("export"),
            catalog: PathBuf::from("benchbuild.json"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        load_json(path)
    }
}

/// Read and deserialize a JSON file.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
