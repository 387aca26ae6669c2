//! doctool - manifest-driven document generation pipeline.

mod cli;
mod config;
mod context;
mod error;
mod logger;
mod pipeline;
mod plugins;
mod provider;
mod registry;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use registry::{PluginLoader, Registry};
use std::{
    path::Path,
    sync::Arc,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { directory, config } => {
            let (config, registry, _) = load_session(directory.as_deref(), &config)?;
            pipeline::build_documents(&config, &registry)
        }
        Commands::Watch { directory, config } => {
            let (config, registry, loader) = load_session(directory.as_deref(), &config)?;
            watch::watch_for_changes(config, registry, &loader)
        }
    }
}

/// Load the manifest and populate a provider registry from its plugin list.
fn load_session(
    directory: Option<&Path>,
    manifest: &Path,
) -> Result<(Arc<Config>, Arc<Registry>, PluginLoader)> {
    let working_directory = directory
        .unwrap_or(Path::new("."))
        .canonicalize()
        .context("invalid project directory")?;
    let manifest_location = working_directory.join(manifest);

    let config = Config::load(&working_directory, &manifest_location)?;
    config.validate()?;

    let loader = plugins::builtin_loader();
    let mut registry = Registry::new();
    registry.validate_plugins(&config, &loader)?;

    Ok((Arc::new(config), Arc::new(registry), loader))
}
