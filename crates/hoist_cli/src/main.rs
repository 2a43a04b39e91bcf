//! hoist CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error
//! - 3: Installation failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod plan;
mod process;
mod records;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const INSTALL_FAILURE: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "hoist=debug"
    } else if cli.quiet {
        "hoist=warn"
    } else {
        "hoist=info"
    };
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if let Ok(directive) = default_level.parse() {
        filter = filter.add_directive(directive);
    }
    // Logging may already be initialized; carry on either way
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Config(args) => commands::config::execute(args).await,
        Commands::Install(args) => commands::install::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Pick an exit code from the error chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.chain().any(|cause| cause.is::<hoist_config::ConfigError>()) {
        ExitCodes::CONFIG_ERROR
    } else if e.chain().any(|cause| cause.is::<hoist_core::CoreError>()) {
        ExitCodes::INSTALL_FAILURE
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_error() {
        let config: anyhow::Result<()> =
            Err(hoist_config::ConfigError::Parse("bad".to_string())).context("writing config");
        assert_eq!(categorize_error(&config.unwrap_err()), ExitCodes::CONFIG_ERROR);

        let install: anyhow::Result<()> = Err(hoist_core::CoreError::Cancelled.into());
        assert_eq!(categorize_error(&install.unwrap_err()), ExitCodes::INSTALL_FAILURE);

        let other = anyhow::anyhow!("plan file missing");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }
}
