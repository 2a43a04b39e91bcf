//! Install orchestrator.
//!
//! Drives one installation attempt through `Pending -> Running ->
//! {Succeeded, Failed}`:
//!
//! 1. Register every component so pollers see the full plan from the start.
//! 2. Build the handle set the installers share.
//! 3. Run the installers, routing their progress through the aggregator.
//! 4. Persist the final installation record.
//! 5. Set the terminal status.
//!
//! The body runs under a panic guard; a panic anywhere in it ends the attempt
//! as Failed with the panic message and backtrace in the log tail.

use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, FutureExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::component::{ComponentInstaller, HandleFactory, RecordStore};
use crate::error::{CoreError, CoreResult, InstallStage, StageExt};
use crate::progress::{progress_channel, ProgressAggregator, ProgressReporter, DEFAULT_PROGRESS_BUFFER};
use crate::recovery;
use crate::state::{InstallState, InstallationRecord, InstallationState, Status};
use crate::store::StatusStore;

/// Default number of installers running at once.
pub const DEFAULT_MAX_CONCURRENT_INSTALLS: usize = 1;

/// Default name written on the installation record.
pub const DEFAULT_RECORD_NAME: &str = "hoist";

/// Installer settings. Unset fields take their defaults in [`Installer::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallerConfig {
    /// Progress channel capacity (default: 1)
    pub progress_buffer: Option<usize>,
    /// Installers allowed to run at once; 1 runs them in order (default: 1)
    pub max_concurrent_installs: Option<usize>,
    /// Name on the installation record (default: "hoist")
    pub record_name: Option<String>,
}

#[derive(Debug, Clone)]
struct Settings {
    progress_buffer: usize,
    max_concurrent_installs: usize,
    record_name: String,
}

impl From<InstallerConfig> for Settings {
    fn from(config: InstallerConfig) -> Self {
        Self {
            progress_buffer: config
                .progress_buffer
                .unwrap_or(DEFAULT_PROGRESS_BUFFER)
                .max(1),
            max_concurrent_installs: config
                .max_concurrent_installs
                .unwrap_or(DEFAULT_MAX_CONCURRENT_INSTALLS)
                .max(1),
            record_name: config
                .record_name
                .unwrap_or_else(|| DEFAULT_RECORD_NAME.to_string()),
        }
    }
}

/// Top-level install state machine.
///
/// Not reentrant: run one `install` at a time per store.
pub struct Installer<H> {
    settings: Settings,
    store: Arc<StatusStore>,
    handles: Arc<dyn HandleFactory<H>>,
    records: Arc<dyn RecordStore>,
    components: Vec<Arc<dyn ComponentInstaller<H>>>,
}

impl<H: Send + Sync + 'static> Installer<H> {
    /// Create an installer with no components.
    pub fn new(
        config: InstallerConfig,
        store: Arc<StatusStore>,
        handles: Arc<dyn HandleFactory<H>>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            settings: config.into(),
            store,
            handles,
            records,
            components: Vec::new(),
        }
    }

    /// Add a component. Components install in the order they are added.
    pub fn component(mut self, component: Arc<dyn ComponentInstaller<H>>) -> Self {
        self.components.push(component);
        self
    }

    /// Add multiple components.
    pub fn components(
        mut self,
        components: impl IntoIterator<Item = Arc<dyn ComponentInstaller<H>>>,
    ) -> Self {
        self.components.extend(components);
        self
    }

    /// Names of the planned components, in install order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Snapshot of the current attempt.
    pub fn status(&self) -> InstallationState {
        self.store.get()
    }

    /// The store this installer reports into.
    pub fn store(&self) -> Arc<StatusStore> {
        Arc::clone(&self.store)
    }

    /// Run one installation attempt.
    ///
    /// Returns `Ok` only if the attempt ends Succeeded.
    pub async fn install(&self, cancel: CancellationToken) -> CoreResult<()> {
        recovery::install_backtrace_hook();

        let started_at = Utc::now();
        self.store.reset();
        if let Err(e) = self.store.set_status(Status::running("Installation started")) {
            warn!("Failed to set running status: {}", e);
        }
        info!("Starting installation of {} components", self.components.len());

        let result = match AssertUnwindSafe(self.run(&cancel, started_at))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = recovery::payload_message(payload.as_ref());
                let backtrace = recovery::take_backtrace()
                    .unwrap_or_else(|| Backtrace::force_capture().to_string());
                error!("Installation panicked: {}", message);
                Err(CoreError::Panicked { message, backtrace })
            }
        };

        self.finalize(&result);
        result
    }

    async fn run(&self, cancel: &CancellationToken, started_at: DateTime<Utc>) -> CoreResult<()> {
        for component in &self.components {
            self.store.register_component(component.name());
        }
        debug!("Registered components: {:?}", self.component_names());

        ensure_active(cancel).stage(InstallStage::BuildHandles)?;
        let handles = self
            .handles
            .build()
            .await
            .stage(InstallStage::BuildHandles)?;

        self.install_components(&handles, cancel)
            .await
            .stage(InstallStage::InstallComponents)?;

        ensure_active(cancel).stage(InstallStage::PersistRecord)?;
        let record = InstallationRecord::installed(
            self.settings.record_name.clone(),
            self.store.get().components,
            started_at,
        );
        self.records
            .persist(&record)
            .await
            .stage(InstallStage::PersistRecord)?;
        info!("Persisted installation record {}", record.id);

        Ok(())
    }

    async fn install_components(&self, handles: &H, cancel: &CancellationToken) -> CoreResult<()> {
        let (sender, receiver) = progress_channel(self.settings.progress_buffer);
        let consumer = ProgressAggregator::spawn(Arc::clone(&self.store), receiver);

        // Cancelled on the first failure so in-flight siblings wind down.
        let abort = cancel.child_token();
        let failure: Mutex<Option<CoreError>> = Mutex::new(None);

        stream::iter(self.components.iter())
            .for_each_concurrent(self.settings.max_concurrent_installs, |component| {
                let reporter =
                    ProgressReporter::new(component.name(), sender.clone(), Arc::clone(&self.store));
                let abort = &abort;
                let failure = &failure;
                async move {
                    if failure.lock().is_some() {
                        debug!("Skipping {} after an earlier failure", component.name());
                        return;
                    }
                    if let Err(e) = self
                        .install_component(component.as_ref(), handles, reporter, abort)
                        .await
                    {
                        abort.cancel();
                        failure.lock().get_or_insert(e);
                    }
                }
            })
            .await;

        // Closing the producer side lets the consumer drain and exit.
        drop(sender);
        if let Err(e) = consumer.await {
            warn!("Progress consumer ended abnormally: {}", e);
        }

        match failure.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn install_component(
        &self,
        component: &dyn ComponentInstaller<H>,
        handles: &H,
        reporter: ProgressReporter,
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        let name = component.name().to_string();
        ensure_active(cancel)?;

        info!("Installing component {}", name);
        self.store.add_logs(format!("Installing {}", name));
        reporter.running("Installing").await;

        match component.install(handles, &reporter, cancel).await {
            Ok(()) => {
                if let Some(event) = reporter
                    .last_event()
                    .filter(|event| event.state == InstallState::Failed)
                {
                    error!("Component {} reported failure: {}", name, event.description);
                    return Err(CoreError::ComponentFailed {
                        component: name,
                        message: event.description,
                    });
                }
                if !reporter.reported_terminal() {
                    reporter.succeeded("Installed").await;
                }
                info!("Component {} installed", name);
                self.store.add_logs(format!("Installed {}", name));
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    CoreError::ComponentFailed { message, .. } => message,
                    other => other.to_string(),
                };
                if reporter.last_state() != Some(InstallState::Failed) {
                    reporter.failed(message.clone()).await;
                }
                error!("Component {} failed: {}", name, message);
                Err(CoreError::ComponentFailed {
                    component: name,
                    message,
                })
            }
        }
    }

    /// Components left Running when the attempt ended never finished.
    fn fail_unfinished(&self) {
        for component in self.store.get().components {
            if component.status.state != InstallState::Running {
                continue;
            }
            warn!("Component {} did not finish", component.name);
            if let Err(e) = self
                .store
                .set_component_status(&component.name, Status::failed("Interrupted"))
            {
                warn!("Failed to mark {} as failed: {}", component.name, e);
            }
        }
    }

    fn finalize(&self, result: &CoreResult<()>) {
        let status = match result {
            Ok(()) => {
                info!("Installation succeeded");
                self.store.add_logs("Installation succeeded");
                Status::succeeded("Installation complete")
            }
            Err(e) => {
                error!("Installation failed: {}", e);
                self.store.add_logs(format!("Installation failed: {}", e));
                if let CoreError::Panicked { backtrace, .. } = e.root() {
                    self.store.add_logs(backtrace);
                }
                self.fail_unfinished();
                Status::failed(summarize(e))
            }
        };

        if let Err(e) = self.store.set_status(status) {
            error!("Failed to set terminal status: {}", e);
        }
    }
}

fn ensure_active(cancel: &CancellationToken) -> CoreResult<()> {
    if cancel.is_cancelled() {
        Err(CoreError::Cancelled)
    } else {
        Ok(())
    }
}

/// Short, single-line description for the terminal status.
fn summarize(err: &CoreError) -> String {
    const MAX_SUMMARY: usize = 200;

    let text = err.to_string();
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.len() <= MAX_SUMMARY {
        return first_line.to_string();
    }
    let mut end = MAX_SUMMARY;
    while !first_line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &first_line[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::MockRecordStore;
    use crate::mock::{FailingHandles, ScriptedInstaller, StaticHandles};
    use crate::state::RecordState;

    fn installer_with(records: MockRecordStore) -> Installer<()> {
        Installer::new(
            InstallerConfig::default(),
            Arc::new(StatusStore::new()),
            Arc::new(StaticHandles::new(())),
            Arc::new(records),
        )
    }

    #[test]
    fn test_config_defaults() {
        let settings = Settings::from(InstallerConfig::default());
        assert_eq!(settings.progress_buffer, 1);
        assert_eq!(settings.max_concurrent_installs, 1);
        assert_eq!(settings.record_name, "hoist");

        let settings = Settings::from(InstallerConfig {
            progress_buffer: Some(0),
            max_concurrent_installs: Some(4),
            record_name: Some("edge".to_string()),
        });
        assert_eq!(settings.progress_buffer, 1);
        assert_eq!(settings.max_concurrent_installs, 4);
        assert_eq!(settings.record_name, "edge");
    }

    #[test]
    fn test_summarize_truncates() {
        let err = CoreError::Setup("x".repeat(500));
        let summary = summarize(&err);
        assert!(summary.len() <= 203);
        assert!(summary.ends_with("..."));
    }

    #[tokio::test]
    async fn test_success_persists_installed_record_once() {
        let mut records = MockRecordStore::new();
        records
            .expect_persist()
            .withf(|record| {
                record.state == RecordState::Installed
                    && record.components.len() == 2
                    && record
                        .components
                        .iter()
                        .all(|c| c.status.state == InstallState::Succeeded)
            })
            .times(1)
            .returning(|_| Ok(()));

        let installer = installer_with(records)
            .component(Arc::new(ScriptedInstaller::new("openebs")))
            .component(Arc::new(ScriptedInstaller::new("registry")));

        installer.install(CancellationToken::new()).await.unwrap();

        let state = installer.status();
        let status = state.status.clone().unwrap();
        assert_eq!(status.state, InstallState::Succeeded);
        assert_eq!(status.description, "Installation complete");
        assert!(state.logs.contains("Installation succeeded"));
    }

    #[tokio::test]
    async fn test_component_failure_skips_record() {
        let mut records = MockRecordStore::new();
        records.expect_persist().times(0);

        let installer = installer_with(records)
            .component(Arc::new(ScriptedInstaller::new("openebs")))
            .component(Arc::new(ScriptedInstaller::new("registry").fail_with("image pull")))
            .component(Arc::new(ScriptedInstaller::new("admin-console")));

        let err = installer.install(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("install components: "));
        assert!(matches!(err.root(), CoreError::ComponentFailed { component, .. } if component == "registry"));

        let state = installer.status();
        assert_eq!(state.status.clone().unwrap().state, InstallState::Failed);
        assert_eq!(state.component("openebs").unwrap().status.state, InstallState::Succeeded);
        assert_eq!(state.component("registry").unwrap().status.state, InstallState::Failed);
        assert_eq!(state.component("admin-console").unwrap().status.state, InstallState::Pending);
    }

    #[tokio::test]
    async fn test_reported_failure_fails_install() {
        let mut records = MockRecordStore::new();
        records.expect_persist().times(0);

        // Reports Failed through progress but returns Ok.
        let registry = ScriptedInstaller::new("registry")
            .event(InstallState::Running, "Pulling images")
            .event(InstallState::Failed, "image pull backoff");
        let installer = installer_with(records).component(Arc::new(registry));

        let err = installer.install(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.root(),
            CoreError::ComponentFailed { component, message }
                if component == "registry" && message == "image pull backoff"
        ));

        let state = installer.status();
        assert_eq!(state.status.clone().unwrap().state, InstallState::Failed);
        let registry = state.component("registry").unwrap();
        assert_eq!(registry.status.state, InstallState::Failed);
        assert_eq!(registry.status.description, "image pull backoff");
    }

    #[tokio::test]
    async fn test_record_failure_fails_install() {
        let mut records = MockRecordStore::new();
        records
            .expect_persist()
            .times(1)
            .returning(|_| Err(CoreError::Persist("api server unavailable".to_string())));

        let installer = installer_with(records).component(Arc::new(ScriptedInstaller::new("openebs")));

        let err = installer.install(CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "persist installation record: Persist failed: api server unavailable"
        );
        let state = installer.status();
        assert_eq!(state.status.clone().unwrap().state, InstallState::Failed);
        assert_eq!(state.component("openebs").unwrap().status.state, InstallState::Succeeded);
    }

    #[tokio::test]
    async fn test_setup_failure_runs_no_component() {
        let mut records = MockRecordStore::new();
        records.expect_persist().times(0);

        let openebs = Arc::new(ScriptedInstaller::new("openebs"));
        let registry = Arc::new(ScriptedInstaller::new("registry"));
        let installer: Installer<()> = Installer::new(
            InstallerConfig::default(),
            Arc::new(StatusStore::new()),
            Arc::new(FailingHandles::new("kubeconfig missing")),
            Arc::new(records),
        )
        .component(openebs.clone())
        .component(registry.clone());

        let err = installer.install(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("build handles: "));
        assert_eq!(openebs.invocations(), 0);
        assert_eq!(registry.invocations(), 0);

        let state = installer.status();
        let names: Vec<_> = state.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["openebs", "registry"]);
        assert!(state.components.iter().all(|c| c.status.state == InstallState::Pending));
        assert_eq!(state.status.clone().unwrap().state, InstallState::Failed);
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_status() {
        let mut records = MockRecordStore::new();
        records.expect_persist().times(0);

        let installer = installer_with(records)
            .component(Arc::new(ScriptedInstaller::new("openebs").panic_with("index out of range")));

        let err = installer.install(CancellationToken::new()).await.unwrap_err();
        match &err {
            CoreError::Panicked { message, backtrace } => {
                assert_eq!(message, "index out of range");
                assert!(!backtrace.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }

        let state = installer.status();
        let status = state.status.clone().unwrap();
        assert_eq!(status.state, InstallState::Failed);
        assert!(status.description.contains("index out of range"));
        assert!(state.logs.contains("Installation panicked"));
        assert_ne!(state.component("openebs").unwrap().status.state, InstallState::Running);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut records = MockRecordStore::new();
        records.expect_persist().times(0);

        let openebs = Arc::new(ScriptedInstaller::new("openebs"));
        let installer = installer_with(records).component(openebs.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = installer.install(cancel).await.unwrap_err();

        assert!(matches!(err.root(), CoreError::Cancelled));
        assert_eq!(openebs.invocations(), 0);
        assert_eq!(installer.status().status.clone().unwrap().description, "build handles: Installation cancelled");
    }

    #[tokio::test]
    async fn test_reinstall_starts_fresh() {
        let mut records = MockRecordStore::new();
        records.expect_persist().times(2).returning(|_| Ok(()));

        let installer = installer_with(records).component(Arc::new(ScriptedInstaller::new("openebs")));

        installer.install(CancellationToken::new()).await.unwrap();
        installer.install(CancellationToken::new()).await.unwrap();

        let state = installer.status();
        assert_eq!(state.components.len(), 1);
        assert_eq!(state.status.clone().unwrap().state, InstallState::Succeeded);
    }
}
