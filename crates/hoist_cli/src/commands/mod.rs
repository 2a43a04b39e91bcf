//! CLI command definitions.

use clap::{Parser, Subcommand};

pub mod config;
pub mod install;

/// hoist - cluster installation orchestrator
#[derive(Parser)]
#[command(name = "hoist")]
#[command(version, about = "hoist - cluster installation orchestrator")]
#[command(long_about = r#"
hoist lays down a cluster configuration file and installs a set of
components concurrently, tracking each one's progress.

COMMANDS:
  config write  → Merge base, vendor and end-user layers into a new config file
  config patch  → Apply one more patch to an existing config file
  config show   → Print the merged config without writing it
  install       → Install the components listed in a plan file

EXIT CODES:
  0 - Success
  1 - General error
  2 - Configuration error
  3 - Installation failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write, patch or inspect the cluster config file
    Config(config::ConfigArgs),

    /// Install the components listed in a plan
    Install(install::InstallArgs),
}
