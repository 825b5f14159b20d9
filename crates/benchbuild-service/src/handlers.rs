//! Command handlers and the default message bus wiring.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use benchbuild_core::{Command, CommandKind, ContainerImage, Event, EventKind};

use crate::error::{DispatchError, RegistryError};
use crate::messagebus::{CommandHandler, MessageBus};
use crate::uow::UnitOfWork;

/// Where `RunProjectContainer` mounts the host build directory.
pub const BUILD_DIR_TARGET: &str = "/app";

fn unexpected(expected: CommandKind, command: &Command) -> DispatchError {
    DispatchError::UnexpectedCommand {
        expected,
        actual: command.kind(),
    }
}

/// Builds project images. An image that already exists is reported as is.
pub struct CreateProjectImageHandler;

#[async_trait]
impl CommandHandler for CreateProjectImageHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::CreateProjectImage
    }

    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let Command::CreateProjectImage(cmd) = command else {
            return Err(unexpected(self.kind(), command));
        };

        if let Some(image) = uow.registry.find_image(&cmd.name).await? {
            info!(tag = %image.name, "Project image already exists");
            return Ok(vec![image.name]);
        }

        let image = uow.registry.images().create(&cmd.name, &cmd.layers).await?;
        Ok(vec![image.name])
    }
}

/// Builds experiment images on top of an existing project image.
pub struct CreateExperimentImageHandler;

#[async_trait]
impl CommandHandler for CreateExperimentImageHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::CreateExperimentImage
    }

    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let Command::CreateExperimentImage(cmd) = command else {
            return Err(unexpected(self.kind(), command));
        };

        if cmd.layers.base().is_some() {
            return Err(RegistryError::ExperimentBase(cmd.name.clone()).into());
        }

        if uow.registry.find_image(&cmd.base).await?.is_none() {
            return Err(RegistryError::UnknownImage(cmd.base.clone()).into());
        }

        if let Some(image) = uow.registry.find_image(&cmd.name).await? {
            info!(tag = %image.name, "Experiment image already exists");
            return Ok(vec![image.name]);
        }

        let layers = ContainerImage::new().from_(&cmd.base).extend(&cmd.layers);
        let image = uow.registry.images().create(&cmd.name, &layers).await?;
        Ok(vec![image.name])
    }
}

/// Creates and starts a one-shot container. A failed start is recorded on
/// the container and does not fail the command.
pub struct RunProjectContainerHandler;

#[async_trait]
impl CommandHandler for RunProjectContainerHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::RunProjectContainer
    }

    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let Command::RunProjectContainer(cmd) = command else {
            return Err(unexpected(self.kind(), command));
        };

        if let Some(build_dir) = &cmd.build_dir {
            uow.registry.mount(
                &cmd.image,
                build_dir.display().to_string(),
                BUILD_DIR_TARGET,
            );
        }

        let mut container = uow.registry.create(&cmd.image, &cmd.name).await?;
        uow.registry.start(&mut container).await?;
        Ok(vec![container.container_id.into_inner()])
    }
}

/// Writes an image archive.
pub struct ExportImageHandler;

#[async_trait]
impl CommandHandler for ExportImageHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ExportImage
    }

    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let Command::ExportImage(cmd) = command else {
            return Err(unexpected(self.kind(), command));
        };

        if uow.registry.find_image(&cmd.image).await?.is_none() {
            return Err(RegistryError::UnknownImage(cmd.image.clone()).into());
        }
        uow.registry.images().save(&cmd.image, &cmd.out_path).await?;
        Ok(vec![cmd.out_path.display().to_string()])
    }
}

/// Loads an image archive.
pub struct ImportImageHandler;

#[async_trait]
impl CommandHandler for ImportImageHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ImportImage
    }

    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let Command::ImportImage(cmd) = command else {
            return Err(unexpected(self.kind(), command));
        };

        uow.registry.images().load(&cmd.image, &cmd.in_path).await?;
        Ok(vec![cmd.image.clone()])
    }
}

/// Removes a container.
pub struct RemoveContainerHandler;

#[async_trait]
impl CommandHandler for RemoveContainerHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::RemoveContainer
    }

    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let Command::RemoveContainer(cmd) = command else {
            return Err(unexpected(self.kind(), command));
        };

        uow.registry.remove(&cmd.container_id).await?;
        Ok(vec![cmd.container_id.to_string()])
    }
}

/// A message bus with every command handler and the default event
/// handlers registered.
pub fn bootstrap() -> Result<MessageBus, DispatchError> {
    let mut bus = MessageBus::new();
    bus.register(CreateProjectImageHandler)?;
    bus.register(CreateExperimentImageHandler)?;
    bus.register(RunProjectContainerHandler)?;
    bus.register(ExportImageHandler)?;
    bus.register(ImportImageHandler)?;
    bus.register(RemoveContainerHandler)?;

    bus.subscribe(EventKind::ContainerCreated, |event| {
        debug!(container_id = %event.container_id(), "Container created");
    });
    bus.subscribe(EventKind::ContainerStarted, |event| {
        debug!(container_id = %event.container_id(), "Container started");
    });
    bus.subscribe(EventKind::ContainerStartFailed, report_start_failure);
    Ok(bus)
}

fn report_start_failure(event: &Event) {
    if let Event::ContainerStartFailed {
        name,
        container_id,
        message,
        ..
    } = event
    {
        warn!(name = %name, container_id = %container_id, "Container start failed");
        eprintln!("Container {} ({}) failed to start:\n{}", name, container_id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use benchbuild_core::{
        CreateExperimentImage, CreateProjectImage, ExportImage, Image, ImportImage, Layer, Mount,
        RemoveContainer, RunProjectContainer,
    };

    use crate::fakes::{FakeBackend, FakeImageStore};
    use crate::uow::UnitOfWorkFactory;

    const PROJECT: &str = "p1/group:HEAD";

    struct Fixture {
        store: Arc<FakeImageStore>,
        backend: Arc<FakeBackend>,
        factory: UnitOfWorkFactory,
        bus: MessageBus,
    }

    fn fixture(store: FakeImageStore, backend: FakeBackend) -> Fixture {
        let store = Arc::new(store);
        let backend = Arc::new(backend);
        Fixture {
            factory: UnitOfWorkFactory::new(store.clone(), backend.clone()),
            store,
            backend,
            bus: bootstrap().unwrap(),
        }
    }

    fn project_image() -> Command {
        CreateProjectImage {
            name: PROJECT.to_string(),
            layers: ContainerImage::new().from_("alpine:3.17").run("make", Vec::new()),
        }
        .into()
    }

    #[test]
    fn test_bootstrap_registers_every_kind() {
        let bus = bootstrap().unwrap();
        for kind in [
            CommandKind::CreateProjectImage,
            CommandKind::CreateExperimentImage,
            CommandKind::RunProjectContainer,
            CommandKind::ExportImage,
            CommandKind::ImportImage,
            CommandKind::RemoveContainer,
        ] {
            assert!(bus.handles(kind), "no handler for {}", kind);
        }
    }

    #[tokio::test]
    async fn test_project_image_built_once() {
        let f = fixture(FakeImageStore::new(), FakeBackend::new());

        let first = f.bus.handle(project_image(), f.factory.begin()).await.unwrap();
        let second = f.bus.handle(project_image(), f.factory.begin()).await.unwrap();

        assert_eq!(first, vec![PROJECT.to_string()]);
        assert_eq!(second, vec![PROJECT.to_string()]);
        assert_eq!(f.store.built(), vec![PROJECT.to_string()]);
    }

    #[tokio::test]
    async fn test_experiment_image_layers_on_base() {
        let f = fixture(
            FakeImageStore::new().with_image(Image::new(PROJECT)),
            FakeBackend::new(),
        );
        let command: Command = CreateExperimentImage {
            base: PROJECT.to_string(),
            name: "e1/p1/group:HEAD".to_string(),
            layers: ContainerImage::new().env("EXPERIMENT", "e1"),
        }
        .into();

        let artifacts = f.bus.handle(command, f.factory.begin()).await.unwrap();

        assert_eq!(artifacts, vec!["e1/p1/group:HEAD".to_string()]);
        let image = f.store.image("e1/p1/group:HEAD").unwrap();
        assert_eq!(image.parent.as_deref(), Some(PROJECT));
        assert_eq!(image.env_var("EXPERIMENT"), Some("e1"));
    }

    #[tokio::test]
    async fn test_experiment_image_requires_base() {
        let f = fixture(FakeImageStore::new(), FakeBackend::new());
        let command: Command = CreateExperimentImage {
            base: PROJECT.to_string(),
            name: "e1/p1/group:HEAD".to_string(),
            layers: ContainerImage::new(),
        }
        .into();

        let err = f.bus.handle(command, f.factory.begin()).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Registry(RegistryError::UnknownImage(ref tag)) if tag == PROJECT
        ));
        assert!(f.store.built().is_empty());
    }

    #[tokio::test]
    async fn test_experiment_image_with_own_base_fails() {
        let f = fixture(
            FakeImageStore::new().with_image(Image::new(PROJECT)),
            FakeBackend::new(),
        );
        let command: Command = CreateExperimentImage {
            base: PROJECT.to_string(),
            name: "e1/p1/group:HEAD".to_string(),
            layers: ContainerImage::new().from_("alpine:3.17").env("EXPERIMENT", "e1"),
        }
        .into();

        let err = f.bus.handle(command, f.factory.begin()).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Registry(RegistryError::ExperimentBase(ref tag)) if tag == "e1/p1/group:HEAD"
        ));
        assert!(f.store.built().is_empty());
    }

    #[tokio::test]
    async fn test_project_image_without_base_fails() {
        let f = fixture(FakeImageStore::new(), FakeBackend::new());
        let command: Command = CreateProjectImage {
            name: PROJECT.to_string(),
            layers: ContainerImage::from_layers(vec![Layer::WorkingDirectory("/src".into())]),
        }
        .into();

        let err = f.bus.handle(command, f.factory.begin()).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Registry(RegistryError::MissingBase(_))
        ));
    }

    #[tokio::test]
    async fn test_run_container_mounts_build_dir() {
        let image = Image::new(PROJECT).with_mount(Mount::new("/declared", "/d"));
        let f = fixture(FakeImageStore::new().with_image(image), FakeBackend::new());
        let command: Command = RunProjectContainer {
            image: PROJECT.to_string(),
            name: "run-p1".to_string(),
            build_dir: Some(PathBuf::from("/tmp/build")),
        }
        .into();

        let artifacts = f.bus.handle(command, f.factory.begin()).await.unwrap();

        assert_eq!(artifacts, vec!["container-0".to_string()]);
        assert_eq!(f.backend.started(), vec!["run-p1".to_string()]);
        let container = f.backend.container("run-p1").unwrap();
        assert_eq!(
            container.image.mounts,
            vec![
                Mount::new("/declared", "/d"),
                Mount::new("/tmp/build", BUILD_DIR_TARGET)
            ]
        );
    }

    #[tokio::test]
    async fn test_run_container_start_failure_is_not_an_error() {
        let f = fixture(
            FakeImageStore::new().with_image(Image::new(PROJECT)),
            FakeBackend::new().fail_start("run-p1"),
        );
        let command: Command = RunProjectContainer {
            image: PROJECT.to_string(),
            name: "run-p1".to_string(),
            build_dir: None,
        }
        .into();

        assert!(f.bus.handle(command, f.factory.begin()).await.is_ok());
    }

    #[tokio::test]
    async fn test_export_requires_image() {
        let f = fixture(FakeImageStore::new(), FakeBackend::new());
        let command: Command = ExportImage {
            image: PROJECT.to_string(),
            out_path: PathBuf::from("export/p1.tar"),
        }
        .into();

        let err = f.bus.handle(command, f.factory.begin()).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Registry(RegistryError::UnknownImage(_))
        ));
        assert!(f.store.saved().is_empty());
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let f = fixture(
            FakeImageStore::new().with_image(Image::new(PROJECT)),
            FakeBackend::new(),
        );
        let archive = PathBuf::from("export/p1_group_HEAD.tar");

        let exported = f
            .bus
            .handle(
                ExportImage {
                    image: PROJECT.to_string(),
                    out_path: archive.clone(),
                }
                .into(),
                f.factory.begin(),
            )
            .await
            .unwrap();
        let imported = f
            .bus
            .handle(
                ImportImage {
                    image: PROJECT.to_string(),
                    in_path: archive.clone(),
                }
                .into(),
                f.factory.begin(),
            )
            .await
            .unwrap();

        assert_eq!(exported, vec![archive.display().to_string()]);
        assert_eq!(imported, vec![PROJECT.to_string()]);
        assert_eq!(f.store.saved(), vec![(PROJECT.to_string(), archive.clone())]);
        assert_eq!(f.store.loaded(), vec![(PROJECT.to_string(), archive)]);
    }

    #[tokio::test]
    async fn test_remove_container() {
        let f = fixture(FakeImageStore::new(), FakeBackend::new());
        let command: Command = RemoveContainer {
            container_id: "abc".into(),
        }
        .into();

        let artifacts = f.bus.handle(command, f.factory.begin()).await.unwrap();

        assert_eq!(artifacts, vec!["abc".to_string()]);
        assert_eq!(f.backend.removed().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_rejects_other_kind() {
        let mut uow = UnitOfWorkFactory::new(
            Arc::new(FakeImageStore::new()),
            Arc::new(FakeBackend::new()),
        )
        .begin();

        let err = ExportImageHandler
            .handle(&project_image(), &mut uow)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::UnexpectedCommand {
                expected: CommandKind::ExportImage,
                actual: CommandKind::CreateProjectImage,
            }
        ));
    }
}
