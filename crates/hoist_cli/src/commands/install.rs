//! Install command - Install the components listed in a plan.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use hoist_config::DEFAULT_CONFIG_PATH;
use hoist_core::{
    CancellationToken, ComponentInstaller, InstallState, InstallationState, Installer, StatusStore,
};

use crate::plan::InstallPlan;
use crate::process::{CommandEnv, CommandEnvFactory, CommandInstaller};
use crate::records::FileRecordStore;

/// Exported to every component process.
pub const CONFIG_ENV_VAR: &str = "HOIST_CONFIG";

const DEFAULT_STATE_DIR: &str = "/var/lib/hoist";

#[derive(Args)]
pub struct InstallArgs {
    /// Plan file listing the components to install
    #[arg(short, long)]
    plan: PathBuf,

    /// Directory for the installation record
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Cluster config file handed to components
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Seconds between status reports while installing
    #[arg(long, default_value_t = 2)]
    poll_interval: u64,
}

pub async fn execute(args: InstallArgs) -> Result<()> {
    let plan = InstallPlan::load(&args.plan)?;
    info!(
        "Installing {} component(s) from {}",
        plan.components.len(),
        args.plan.display()
    );

    let installer = build_installer(&plan, &args);
    let store = installer.store();

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling installation");
                cancel.cancel();
            }
        })
    };

    let done = CancellationToken::new();
    let poller = tokio::spawn(poll_status(
        store.clone(),
        Duration::from_secs(args.poll_interval.max(1)),
        done.clone(),
    ));

    let result = installer.install(cancel).await;

    done.cancel();
    if let Err(e) = poller.await {
        warn!("Status poller stopped abnormally: {}", e);
    }
    interrupt.abort();

    print_summary(&store.get());
    result.context("Installation failed")?;

    println!("✅ Installation complete");
    Ok(())
}

fn build_installer(plan: &InstallPlan, args: &InstallArgs) -> Installer<CommandEnv> {
    let workdir = plan
        .workdir
        .clone()
        .unwrap_or_else(|| args.state_dir.join("work"));
    let mut env = plan.env.clone();
    env.insert(
        CONFIG_ENV_VAR.to_string(),
        args.config.to_string_lossy().into_owned(),
    );

    let components = plan.components.iter().map(|component| {
        Arc::new(CommandInstaller::new(component.clone())) as Arc<dyn ComponentInstaller<CommandEnv>>
    });

    Installer::new(
        plan.installer.clone(),
        Arc::new(StatusStore::new()),
        Arc::new(CommandEnvFactory::new(workdir, env)),
        Arc::new(FileRecordStore::new(&args.state_dir)),
    )
    .components(components)
}

/// Log the overall status whenever it changes, until `done` fires.
async fn poll_status(store: Arc<StatusStore>, interval: Duration, done: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    let mut last = None;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                let line = status_line(&store.get());
                if last.as_ref() != Some(&line) {
                    info!("{}", line);
                    last = Some(line);
                }
            }
        }
    }
}

fn status_line(state: &InstallationState) -> String {
    let overall = match &state.status {
        Some(status) => format!("{}: {}", status.state, status.description),
        None => "not started".to_string(),
    };
    let finished = state
        .components
        .iter()
        .filter(|c| c.status.state.is_terminal())
        .count();
    format!("{} ({}/{} components done)", overall, finished, state.components.len())
}

fn print_summary(state: &InstallationState) {
    for component in &state.components {
        let icon = match component.status.state {
            InstallState::Succeeded => "✅",
            InstallState::Failed => "❌",
            InstallState::Running => "⏳",
            InstallState::Pending => "⏸️ ",
        };
        println!(
            "   {} {}: {}",
            icon, component.name, component.status.description
        );
    }
}
