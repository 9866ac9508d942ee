use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use schemashift::{
    ChannelObserver, MigrationConfig, MigrationOptions, Store, StoreController, StoreKind,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "schemashift")]
#[command(about = "Inspect and migrate versioned object stores")]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of schema definitions
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    /// Directory of mapping files
    #[arg(long, global = true)]
    mappings: Option<PathBuf>,

    /// Target version name (defaults to the latest)
    #[arg(long, global = true)]
    target: Option<String>,

    /// Only use mapping files, never infer mappings
    #[arg(long, global = true)]
    no_infer: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered schema versions in enumeration order
    Versions,
    /// Print the identity of a schema version
    Fingerprint {
        /// Version name (defaults to the target version)
        version: Option<String>,
    },
    /// Show which version a store is at and whether it needs migrating
    Status {
        store: PathBuf,
        #[arg(long)]
        kind: Option<StoreKind>,
    },
    /// Print the migration path for a store without running it
    Plan {
        store: PathBuf,
        #[arg(long)]
        kind: Option<StoreKind>,
    },
    /// Migrate a store to the target version
    Migrate {
        store: PathBuf,
        #[arg(long)]
        kind: Option<StoreKind>,
        /// Write the migrated store here instead of replacing the original
        #[arg(long)]
        output: Option<PathBuf>,
        /// Remove the original after migrating to --output
        #[arg(long)]
        delete_source: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let controller = StoreController::new(load_config(&cli)?)
        .context("Failed to initialise the store controller")?;

    match cli.command {
        Command::Versions => list_versions(&controller),
        Command::Fingerprint { version } => print_fingerprint(&controller, version.as_deref()),
        Command::Status { store, kind } => {
            let store = open(&controller, &store, kind).await?;
            print_status(&controller, &store)
        }
        Command::Plan { store, kind } => {
            let store = open(&controller, &store, kind).await?;
            let plan = controller.plan(&store)?;
            println!("{}", plan.describe());
            for (index, step) in plan.steps().iter().enumerate() {
                println!(
                    "  step {}: {} -> {} ({:?} mapping, {} entity mappings)",
                    index,
                    step.source().name(),
                    step.destination().name(),
                    step.mapping().origin,
                    step.mapping().entities.len()
                );
            }
            Ok(())
        }
        Command::Migrate {
            store,
            kind,
            output,
            delete_source,
        } => {
            let store = open(&controller, &store, kind).await?;
            migrate(controller, store, output, delete_source).await
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn,schemashift=info",
        1 => "info,schemashift=debug",
        2 => "debug,schemashift=trace",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<MigrationConfig> {
    let mut config = match &cli.config {
        Some(path) => MigrationConfig::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => MigrationConfig::default(),
    };
    if let Some(models) = &cli.models {
        config.models_dir = models.clone();
    }
    if let Some(mappings) = &cli.mappings {
        config.mappings_dir = Some(mappings.clone());
    }
    if let Some(target) = &cli.target {
        config.target_version = Some(target.clone());
    }
    if cli.no_infer {
        config.infer_mappings = false;
    }
    config.validate()?;
    Ok(config)
}

async fn open(controller: &StoreController, path: &Path, kind: Option<StoreKind>) -> Result<Store> {
    let kind = kind
        .or_else(|| StoreKind::from_extension(path))
        .ok_or_else(|| anyhow!("Cannot tell the kind of '{}', pass --kind", path.display()))?;
    controller
        .open_store(path, kind)
        .await
        .with_context(|| format!("Failed to open store '{}'", path.display()))
}

fn list_versions(controller: &StoreController) -> Result<()> {
    let current = controller.current_version()?;
    for version in controller.registry().all_versions() {
        let marker = if version.identity() == current.identity() { "*" } else { " " };
        println!("{} {:<16} {}", marker, version.name(), version.identity());
    }
    Ok(())
}

fn print_fingerprint(controller: &StoreController, name: Option<&str>) -> Result<()> {
    let version = match name {
        Some(name) => controller.registry().version_named(name)?,
        None => controller.current_version()?,
    };
    println!("{}", version.identity());
    Ok(())
}

fn print_status(controller: &StoreController, store: &Store) -> Result<()> {
    let fingerprint = store.fingerprint()?;
    let version = controller
        .registry()
        .version_with_identity(fingerprint)
        .map(|version| version.name().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    println!("store:       {store}");
    println!("version:     {version} ({fingerprint})");
    println!("target:      {}", controller.current_version()?.name());
    println!("migration:   {}", if controller.is_migration_needed(store)? { "needed" } else { "not needed" });
    Ok(())
}

async fn migrate(
    controller: StoreController,
    store: Store,
    output: Option<PathBuf>,
    delete_source: bool,
) -> Result<()> {
    let (observer, mut fractions) = ChannelObserver::new();
    let controller = controller.with_observer(observer);

    let mut options = MigrationOptions::default()
        .deleting_source(delete_source || controller.config().delete_source);
    if let Some(output) = output {
        options = options.into_location(output);
    }

    let printer = tokio::spawn(async move {
        while let Some(fraction) = fractions.recv().await {
            eprintln!("progress: {:>5.1}%", fraction * 100.0);
        }
    });

    let result = controller.spawn_migration(store, options).await;
    // the controller holds the last sender
    drop(controller);
    let _ = printer.await;

    let migrated = result.context("Migration task panicked")??;
    println!("migrated store: {migrated}");
    Ok(())
}
