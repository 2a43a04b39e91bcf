//! Components installed by running an external program.
//!
//! Output lines go to the installation log tail. A stdout line of the form
//! `progress: <text>` also becomes the component's running description.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use hoist_core::{
    CancellationToken, ComponentInstaller, CoreError, CoreResult, HandleFactory, ProgressReporter,
};

use crate::plan::ComponentPlan;

/// Prefix marking a progress line on stdout.
pub const PROGRESS_PREFIX: &str = "progress:";

/// Environment shared by every component process.
#[derive(Debug, Clone)]
pub struct CommandEnv {
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// Builds the [`CommandEnv`], creating the working directory.
pub struct CommandEnvFactory {
    workdir: PathBuf,
    env: BTreeMap<String, String>,
}

impl CommandEnvFactory {
    pub fn new(workdir: PathBuf, env: BTreeMap<String, String>) -> Self {
        Self { workdir, env }
    }
}

#[async_trait]
impl HandleFactory<CommandEnv> for CommandEnvFactory {
    async fn build(&self) -> CoreResult<CommandEnv> {
        tokio::fs::create_dir_all(&self.workdir).await.map_err(|e| {
            CoreError::Setup(format!(
                "cannot create working directory {}: {}",
                self.workdir.display(),
                e
            ))
        })?;

        debug!("Working directory {:?}", self.workdir);
        Ok(CommandEnv {
            workdir: self.workdir.clone(),
            env: self.env.clone(),
        })
    }
}

/// Runs one program to install one component.
pub struct CommandInstaller {
    plan: ComponentPlan,
}

impl CommandInstaller {
    pub fn new(plan: ComponentPlan) -> Self {
        Self { plan }
    }

    fn failed(&self, message: impl Into<String>) -> CoreError {
        CoreError::ComponentFailed {
            component: self.plan.name.clone(),
            message: message.into(),
        }
    }

    async fn handle_line(&self, stream: &str, line: &str, progress: &ProgressReporter) {
        progress.log(format!("[{}] {}", stream, line));
        if stream == "stdout" {
            if let Some(description) = line.strip_prefix(PROGRESS_PREFIX) {
                progress.running(description.trim()).await;
            }
        }
    }
}

#[async_trait]
impl ComponentInstaller<CommandEnv> for CommandInstaller {
    fn name(&self) -> &str {
        &self.plan.name
    }

    async fn install(
        &self,
        handles: &CommandEnv,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        info!("[{}] Running {} {:?}", self.plan.name, self.plan.program, self.plan.args);

        let mut child = Command::new(&self.plan.program)
            .args(&self.plan.args)
            .envs(&handles.env)
            .envs(&self.plan.env)
            .current_dir(&handles.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failed(format!("failed to start {}: {}", self.plan.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.failed("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.failed("stderr not captured"))?;
        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let (mut stdout_done, mut stderr_done) = (false, false);

        while !(stdout_done && stderr_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("[{}] Cancelled, stopping {}", self.plan.name, self.plan.program);
                    if let Err(e) = child.kill().await {
                        warn!("[{}] Failed to stop process: {}", self.plan.name, e);
                    }
                    return Err(CoreError::Cancelled);
                }
                line = stdout.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => self.handle_line("stdout", &line, progress).await,
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        warn!("[{}] Error reading stdout: {}", self.plan.name, e);
                        stdout_done = true;
                    }
                },
                line = stderr.next_line(), if !stderr_done => match line {
                    Ok(Some(line)) => self.handle_line("stderr", &line, progress).await,
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        warn!("[{}] Error reading stderr: {}", self.plan.name, e);
                        stderr_done = true;
                    }
                },
            }
        }

        let status = tokio::select! {
            // Dropping the child kills it.
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            status = child.wait() => status
                .map_err(|e| self.failed(format!("failed to wait for {}: {}", self.plan.program, e)))?,
        };

        if status.success() {
            debug!("[{}] {} exited successfully", self.plan.name, self.plan.program);
            Ok(())
        } else {
            Err(self.failed(format!("{} exited with {}", self.plan.program, status)))
        }
    }
}
