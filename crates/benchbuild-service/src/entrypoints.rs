//! Orchestration entry points: turn a selection of projects and
//! experiments into commands and dispatch them one at a time.

use std::path::PathBuf;

use tracing::{info, warn};

use benchbuild_core::{
    sanitize_tag, Command, CreateExperimentImage, CreateProjectImage, ExportImage, ImportImage,
    RunProjectContainer,
};

use crate::catalog::{enumerate_projects, Catalog, Experiment, ProjectVariant};
use crate::config::Config;
use crate::error::{DispatchError, RegistryError};
use crate::messagebus::MessageBus;
use crate::uow::UnitOfWorkFactory;

/// Exit status when nothing was selected.
pub const EXIT_NO_SELECTION: i32 = -2;

/// What the user asked for on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub experiments: Vec<String>,
    pub groups: Vec<String>,
    pub projects: Vec<String>,
}

/// Experiments and project variants a selection resolved to.
struct Resolved<'a> {
    experiments: Vec<&'a Experiment>,
    variants: Vec<ProjectVariant>,
}

/// Drives the message bus for a catalog.
pub struct Orchestrator {
    bus: MessageBus,
    factory: UnitOfWorkFactory,
    catalog: Catalog,
    build_dir: PathBuf,
    export_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        bus: MessageBus,
        factory: UnitOfWorkFactory,
        catalog: Catalog,
        config: &Config,
    ) -> Self {
        Self {
            bus,
            factory,
            catalog,
            build_dir: config.build_dir.clone(),
            export_dir: config.export_dir.clone(),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Build every project image, then every experiment image.
    ///
    /// Returns [`EXIT_NO_SELECTION`] if no experiment or no project was
    /// selected, 0 otherwise. The first failing command aborts the run.
    pub async fn run_build(&self, selection: &Selection) -> Result<i32, DispatchError> {
        let Some(resolved) = self.resolve(selection) else {
            return Ok(EXIT_NO_SELECTION);
        };

        self.create_project_images(&resolved.variants).await?;
        self.create_experiment_images(&resolved.experiments, &resolved.variants)
            .await?;
        Ok(0)
    }

    /// Build as [`run_build`](Self::run_build) does, then run one container
    /// per experiment image with its own build directory mounted.
    pub async fn run_containers(&self, selection: &Selection) -> Result<i32, DispatchError> {
        let Some(resolved) = self.resolve(selection) else {
            return Ok(EXIT_NO_SELECTION);
        };

        self.create_project_images(&resolved.variants).await?;
        self.create_experiment_images(&resolved.experiments, &resolved.variants)
            .await?;

        for experiment in &resolved.experiments {
            for variant in &resolved.variants {
                let image = experiment.image_tag(variant);
                let name = sanitize_tag(&image);
                let build_dir = self.build_dir.join(&name);
                tokio::fs::create_dir_all(&build_dir)
                    .await
                    .map_err(RegistryError::from)?;

                let command = RunProjectContainer {
                    image,
                    name,
                    build_dir: Some(build_dir),
                };
                let containers = self.dispatch(command.into()).await?;
                report("The following containers ran:", &containers);
            }
        }
        Ok(0)
    }

    /// Write every selected project and experiment image to
    /// `{export_dir}/{tag}.tar`.
    pub async fn export_images(&self, selection: &Selection) -> Result<i32, DispatchError> {
        let Some(resolved) = self.resolve(selection) else {
            return Ok(EXIT_NO_SELECTION);
        };

        for image in image_tags(&resolved) {
            let command = ExportImage {
                out_path: self.archive_path(&image),
                image,
            };
            let archives = self.dispatch(command.into()).await?;
            report("The following archives were written:", &archives);
        }
        Ok(0)
    }

    /// Load every selected project and experiment image from
    /// `{export_dir}/{tag}.tar`.
    pub async fn import_images(&self, selection: &Selection) -> Result<i32, DispatchError> {
        let Some(resolved) = self.resolve(selection) else {
            return Ok(EXIT_NO_SELECTION);
        };

        for image in image_tags(&resolved) {
            let command = ImportImage {
                in_path: self.archive_path(&image),
                image,
            };
            let images = self.dispatch(command.into()).await?;
            report("The following images are available:", &images);
        }
        Ok(0)
    }

    /// Build one image per project variant.
    pub async fn create_project_images(
        &self,
        variants: &[ProjectVariant],
    ) -> Result<Vec<String>, DispatchError> {
        let mut available = Vec::new();
        for variant in variants {
            let command = CreateProjectImage {
                name: variant.image_tag(),
                layers: variant.container.clone(),
            };
            let images = self.dispatch(command.into()).await?;
            report("The following images are available:", &images);
            available.extend(images);
        }
        Ok(available)
    }

    /// Build one image per experiment and project variant.
    pub async fn create_experiment_images(
        &self,
        experiments: &[&Experiment],
        variants: &[ProjectVariant],
    ) -> Result<Vec<String>, DispatchError> {
        let mut available = Vec::new();
        for experiment in experiments {
            for variant in variants {
                let command = CreateExperimentImage {
                    base: variant.image_tag(),
                    name: experiment.image_tag(variant),
                    layers: experiment.container.clone(),
                };
                let images = self.dispatch(command.into()).await?;
                report("The following images are available:", &images);
                available.extend(images);
            }
        }
        Ok(available)
    }

    async fn dispatch(&self, command: Command) -> Result<Vec<String>, DispatchError> {
        self.bus.handle(command, self.factory.begin()).await
    }

    fn archive_path(&self, tag: &str) -> PathBuf {
        self.export_dir.join(format!("{}.tar", sanitize_tag(tag)))
    }

    fn resolve(&self, selection: &Selection) -> Option<Resolved<'_>> {
        let experiments = self.catalog.select_experiments(&selection.experiments);
        if !experiments.unknown.is_empty() {
            warn!(unknown = ?experiments.unknown, "Unknown experiments");
            println!(
                "Could not find {:?} in the experiment registry.",
                experiments.unknown
            );
        }
        if experiments.wanted.is_empty() {
            println!("Could not find any experiment. Exiting.");
            return None;
        }

        let projects = self
            .catalog
            .select_projects(&selection.projects, &selection.groups);
        let variants = enumerate_projects(&projects);
        if variants.is_empty() {
            println!("No projects selected.");
            return None;
        }

        info!(
            experiments = experiments.wanted.len(),
            variants = variants.len(),
            "Resolved selection"
        );
        Some(Resolved {
            experiments: experiments.wanted,
            variants,
        })
    }
}

/// Project image tags followed by experiment image tags.
fn image_tags(resolved: &Resolved<'_>) -> Vec<String> {
    let projects = resolved.variants.iter().map(ProjectVariant::image_tag);
    let experiments = resolved
        .experiments
        .iter()
        .flat_map(|e| resolved.variants.iter().map(move |v| e.image_tag(v)));
    projects.chain(experiments).collect()
}

fn report(header: &str, artifacts: &[String]) {
    println!("{}", header);
    for artifact in artifacts {
        println!("   {}", artifact);
    }
}
