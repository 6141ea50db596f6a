// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use packsmith::manifest::evaluate_file;
use packsmith::{BuildEnv, Collaborators, Packager, PackagerConfig};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

/// Runtime version used when no config file is given
const RUNTIME_VERSION_VAR: &str = "PACKSMITH_RUNTIME_VERSION";
/// Runtime host used when no config file is given
const RUNTIME_HOST_VAR: &str = "PACKSMITH_RUNTIME_HOST";

#[derive(Parser)]
#[command(name = "packsmith")]
#[command(author, version, about = "Assemble packages from manifests", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Install directory, overriding the configuration
    #[arg(short, long, global = true)]
    install_dir: Option<PathBuf>,

    /// Platform identifier, overriding the configuration
    #[arg(short, long, global = true)]
    platform: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every package declared in the given manifests
    Build {
        /// Manifest files
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<PackagerConfig> {
    let mut config = match &cli.config {
        Some(path) => PackagerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let Some(install_dir) = &cli.install_dir else {
                bail!("either --config or --install-dir is required");
            };
            PackagerConfig::new(
                install_dir,
                &env::var(RUNTIME_VERSION_VAR).unwrap_or_default(),
                &env::var(RUNTIME_HOST_VAR).unwrap_or_default(),
            )
        }
    };
    if let Some(install_dir) = &cli.install_dir {
        config.install_dir = install_dir.clone();
    }
    if let Some(platform) = &cli.platform {
        config.platform = Some(platform.clone());
    }
    Ok(config)
}

fn build(config: PackagerConfig, manifests: &[PathBuf]) -> Result<()> {
    let env = BuildEnv::new(config).context("Invalid packaging environment")?;
    let collaborators = Collaborators::for_env(&env)?;
    let mut packager = Packager::new(env, collaborators)?;

    for manifest in manifests {
        info!("Reading {}", manifest.display());
        evaluate_file(&mut packager, Path::new(manifest))
            .with_context(|| format!("Failed to build {}", manifest.display()))?;
    }

    let built = packager.finish()?;
    for package in &built {
        println!(
            "{} {} -> {}",
            package.kind,
            package.name,
            package.path.display()
        );
    }
    info!("Built {} package(s)", built.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    match &cli.command {
        Commands::Build { manifests } => build(config, manifests),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
