//! benchbuild CLI - build, run and ship experiment container images.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use benchbuild_core::Mount;
use benchbuild_service::{
    bootstrap, Catalog, Config, Orchestrator, Selection, UnitOfWorkFactory,
};

/// benchbuild - compiler experiments in containers
#[derive(Parser)]
#[command(name = "benchbuild")]
#[command(about = "Build and run benchbuild experiment images", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project and experiment catalog (JSON)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Extra bind mount for every container
    #[arg(long = "mount", value_name = "SRC:TGT", global = true)]
    mounts: Vec<Mount>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage experiment containers
    Container {
        #[command(subcommand)]
        action: ContainerCommand,
    },
}

#[derive(Subcommand)]
enum ContainerCommand {
    /// Build project and experiment images
    Build(SelectionArgs),

    /// Build images, then run one container per experiment image
    Run(SelectionArgs),

    /// Save images to the export directory
    Export(SelectionArgs),

    /// Load images from the export directory
    Import(SelectionArgs),
}

#[derive(Args, Debug)]
struct SelectionArgs {
    /// Experiments to use
    #[arg(short = 'E', long = "experiment")]
    experiments: Vec<String>,

    /// Restrict projects to these groups
    #[arg(short = 'G', long = "group", requires = "experiments")]
    groups: Vec<String>,

    /// Projects to use (`name` or `name/group`); all if omitted
    projects: Vec<String>,
}

impl From<SelectionArgs> for Selection {
    fn from(args: SelectionArgs) -> Self {
        Self {
            experiments: args.experiments,
            groups: args.groups,
            projects: args.projects,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    debug!(?config, "Loaded configuration");

    let catalog = Catalog::load(&config.catalog)?;
    let orchestrator = Orchestrator::new(
        bootstrap()?,
        UnitOfWorkFactory::podman(&config),
        catalog,
        &config,
    );

    let Commands::Container { action } = cli.command;
    let result = match action {
        ContainerCommand::Build(args) => orchestrator.run_build(&args.into()).await,
        ContainerCommand::Run(args) => orchestrator.run_containers(&args.into()).await,
        ContainerCommand::Export(args) => orchestrator.export_images(&args.into()).await,
        ContainerCommand::Import(args) => orchestrator.import_images(&args.into()).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "benchbuild=debug"
    } else {
        "benchbuild=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration file (or defaults) overridden by command line flags.
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(catalog) = &cli.catalog {
        config.catalog = catalog.clone();
    }
    config.mounts.extend(cli.mounts.iter().cloned());
    Ok(config)
}
