//! Config command - Write, patch and show the cluster config file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use hoist_config::{
    ConfigBundle, ConfigWriter, DirectoryBundle, StaticBundle, DEFAULT_CONFIG_PATH,
};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Merge the layers and write a new config file
    Write(WriteArgs),

    /// Apply a patch to an existing config file
    Patch(PatchArgs),

    /// Print the merged config
    Show(LayerArgs),
}

/// Where the three layers come from.
#[derive(Args)]
struct LayerArgs {
    /// Directory holding base.yaml, vendor.yaml and overrides.yaml
    #[arg(long, conflicts_with_all = ["base", "vendor", "overrides"])]
    bundle: Option<PathBuf>,

    /// Base configuration (defaults to a generated one)
    #[arg(long)]
    base: Option<PathBuf>,

    /// Vendor override patch
    #[arg(long)]
    vendor: Option<PathBuf>,

    /// End-user override patch
    #[arg(long)]
    overrides: Option<PathBuf>,
}

#[derive(Args)]
struct WriteArgs {
    /// Destination of the config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    path: PathBuf,

    #[command(flatten)]
    layers: LayerArgs,
}

#[derive(Args)]
struct PatchArgs {
    /// Config file to patch
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    path: PathBuf,

    /// Patch document to apply
    #[arg(long)]
    patch: PathBuf,
}

pub async fn execute(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Write(args) => write(args),
        ConfigCommand::Patch(args) => patch(args),
        ConfigCommand::Show(layers) => show(layers),
    }
}

fn write(args: WriteArgs) -> Result<()> {
    info!("Writing cluster config to {}", args.path.display());

    let bundle = args.layers.bundle()?;
    let config = ConfigWriter::create(&args.path, bundle.as_ref())
        .with_context(|| format!("Failed to write {}", args.path.display()))?;

    println!("✅ Wrote {} ({})", args.path.display(), config.metadata.name);
    Ok(())
}

fn patch(args: PatchArgs) -> Result<()> {
    info!("Patching cluster config at {}", args.path.display());

    let patch = read(&args.patch)?;
    ConfigWriter::patch_existing(&args.path, &patch)
        .with_context(|| format!("Failed to patch {}", args.path.display()))?;

    println!("✅ Patched {}", args.path.display());
    Ok(())
}

fn show(layers: LayerArgs) -> Result<()> {
    let bundle = layers.bundle()?;
    let rendered = ConfigWriter::render(bundle.as_ref()).context("Failed to merge config")?;
    print!("{}", rendered);
    Ok(())
}

impl LayerArgs {
    fn bundle(&self) -> Result<Box<dyn ConfigBundle>> {
        if let Some(dir) = &self.bundle {
            if !dir.is_dir() {
                anyhow::bail!("Bundle directory not found: {}", dir.display());
            }
            return Ok(Box::new(DirectoryBundle::new(dir)));
        }

        let mut bundle = StaticBundle::new();
        if let Some(path) = &self.base {
            bundle = bundle.with_base(read(path)?);
        }
        if let Some(path) = &self.vendor {
            bundle = bundle.with_vendor(read(path)?);
        }
        if let Some(path) = &self.overrides {
            bundle = bundle.with_end_user(read(path)?);
        }
        Ok(Box::new(bundle))
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
