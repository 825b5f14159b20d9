//! Project and experiment catalog.
//!
//! The catalog is a JSON file declaring which projects exist, which version
//! axes each one is built along, and the layers of every project and
//! experiment image.
//!
//! ```json
//! {
//!   "projects": [{
//!     "name": "lulesh",
//!     "group": "benchbuild",
//!     "source": [{"name": "lulesh.git", "versions": ["HEAD", "v2.0.3"]}],
//!     "container": [{"from": "benchbuild:alpine"}]
//!   }],
//!   "experiments": [{"name": "empty", "container": []}]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use benchbuild_core::{
    check_name_component, check_tag_component, make_image_name, make_version_tag,
    ContainerImage, CoreError,
};

use crate::config::load_json;
use crate::error::LoadError;

/// One version axis of a project, usually one source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionAxis {
    pub name: String,
    pub versions: Vec<String>,
}

/// A buildable project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub source: Vec<VersionAxis>,
    #[serde(default)]
    pub container: ContainerImage,
}

impl Project {
    /// Every combination of versions across this project's axes, first
    /// axis varying slowest. A project without axes has a single variant.
    pub fn variants(&self) -> Vec<ProjectVariant> {
        let mut combinations: Vec<Vec<String>> = vec![Vec::new()];
        for axis in &self.source {
            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    axis.versions.iter().map(move |version| {
                        let mut next = prefix.clone();
                        next.push(version.clone());
                        next
                    })
                })
                .collect();
        }

        combinations
            .into_iter()
            .map(|versions| ProjectVariant {
                name: self.name.clone(),
                group: self.group.clone(),
                versions,
                container: self.container.clone(),
            })
            .collect()
    }

    fn matches(&self, selector: &str) -> bool {
        selector == self.name || selector == format!("{}/{}", self.name, self.group)
    }
}

/// An experiment: layers added on top of every selected project image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    #[serde(default)]
    pub container: ContainerImage,
}

impl Experiment {
    /// Tag of this experiment's image for one project variant.
    pub fn image_tag(&self, variant: &ProjectVariant) -> String {
        make_image_name(
            &format!("{}/{}/{}", self.name, variant.name, variant.group),
            &variant.version_tag(),
        )
    }
}

/// A project pinned to one version per axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectVariant {
    pub name: String,
    pub group: String,
    pub versions: Vec<String>,
    pub container: ContainerImage,
}

impl ProjectVariant {
    pub fn version_tag(&self) -> String {
        make_version_tag(&self.versions)
    }

    /// `{project}/{group}:{version}`.
    pub fn image_tag(&self) -> String {
        make_image_name(&format!("{}/{}", self.name, self.group), &self.version_tag())
    }
}

/// All variants of `projects`, in order.
pub fn enumerate_projects(projects: &[&Project]) -> Vec<ProjectVariant> {
    projects.iter().flat_map(|p| p.variants()).collect()
}

/// Experiments matched by name, plus the names that matched nothing.
#[derive(Debug)]
pub struct ExperimentSelection<'a> {
    pub wanted: Vec<&'a Experiment>,
    pub unknown: Vec<String>,
}

/// The set of known projects and experiments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
}

impl Catalog {
    /// Load and validate a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let catalog: Self = load_json(path)?;
        catalog.validate().map_err(|source| LoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(catalog)
    }

    /// Check that every name, group and version can appear in an image tag
    /// and that experiments do not replace the project image as their base.
    pub fn validate(&self) -> Result<(), CoreError> {
        for project in &self.projects {
            check_name_component(&project.name)?;
            check_name_component(&project.group)?;
            for axis in &project.source {
                for version in &axis.versions {
                    check_tag_component(version)?;
                }
            }
        }
        for experiment in &self.experiments {
            check_name_component(&experiment.name)?;
            if experiment.container.base().is_some() {
                return Err(CoreError::ExperimentBase(experiment.name.clone()));
            }
        }
        Ok(())
    }

    /// Select projects by name (`name` or `name/group`) and group.
    ///
    /// Empty filters match everything, so no arguments select every
    /// project. Catalog order is kept.
    pub fn select_projects(&self, names: &[String], groups: &[String]) -> Vec<&Project> {
        self.projects
            .iter()
            .filter(|p| names.is_empty() || names.iter().any(|n| p.matches(n)))
            .filter(|p| groups.is_empty() || groups.contains(&p.group))
            .collect()
    }

    /// Select experiments by name, in catalog order.
    pub fn select_experiments(&self, names: &[String]) -> ExperimentSelection<'_> {
        let wanted = self
            .experiments
            .iter()
            .filter(|e| names.contains(&e.name))
            .collect();

        let mut seen = HashSet::new();
        let unknown = names
            .iter()
            .filter(|n| !self.experiments.iter().any(|e| &e.name == *n))
            .filter(|n| seen.insert(*n))
            .cloned()
            .collect();

        ExperimentSelection { wanted, unknown }
    }
}
