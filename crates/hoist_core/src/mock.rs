//! Test doubles for the installer seams.
//!
//! Scripted installers, canned handle factories and an in-memory record store,
//! for exercising the orchestrator without a cluster.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::component::{ComponentInstaller, HandleFactory, RecordStore};
use crate::error::{CoreError, CoreResult};
use crate::progress::ProgressReporter;
use crate::state::{InstallState, InstallationRecord};

/// How a scripted installer ends once its events are sent.
#[derive(Debug, Clone)]
pub enum ScriptOutcome {
    Succeed,
    Fail(String),
    Panic(String),
    /// Block until cancelled, then return [`CoreError::Cancelled`]
    AwaitCancel,
}

/// Installer that replays a fixed list of progress events.
#[derive(Debug, Clone)]
pub struct ScriptedInstaller {
    name: String,
    events: Vec<(InstallState, String)>,
    outcome: ScriptOutcome,
    step_delay: Option<Duration>,
    invocations: Arc<AtomicUsize>,
}

impl ScriptedInstaller {
    /// An installer that sends nothing and succeeds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            outcome: ScriptOutcome::Succeed,
            step_delay: None,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a progress event.
    pub fn event(mut self, state: InstallState, description: impl Into<String>) -> Self {
        self.events.push((state, description.into()));
        self
    }

    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.outcome = ScriptOutcome::Fail(message.into());
        self
    }

    pub fn panic_with(mut self, message: impl Into<String>) -> Self {
        self.outcome = ScriptOutcome::Panic(message.into());
        self
    }

    pub fn wait_for_cancel(mut self) -> Self {
        self.outcome = ScriptOutcome::AwaitCancel;
        self
    }

    /// Sleep between events.
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Number of times `install` was called.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<H: Send + Sync + 'static> ComponentInstaller<H> for ScriptedInstaller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn install(
        &self,
        _handles: &H,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        for (state, description) in &self.events {
            progress.log(format!("{} {}", state, description));
            progress.report(*state, description.clone()).await;
            if let Some(delay) = self.step_delay {
                tokio::time::sleep(delay).await;
            }
        }

        match &self.outcome {
            ScriptOutcome::Succeed => Ok(()),
            ScriptOutcome::Fail(message) => Err(CoreError::ComponentFailed {
                component: self.name.clone(),
                message: message.clone(),
            }),
            ScriptOutcome::Panic(message) => panic!("{}", message),
            ScriptOutcome::AwaitCancel => {
                cancel.cancelled().await;
                Err(CoreError::Cancelled)
            }
        }
    }
}

/// Handle factory that hands out clones of a fixed value.
#[derive(Debug, Clone)]
pub struct StaticHandles<H> {
    handles: H,
    builds: Arc<AtomicUsize>,
}

impl<H> StaticHandles<H> {
    pub fn new(handles: H) -> Self {
        Self {
            handles,
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `build` was called.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<H: Clone + Send + Sync + 'static> HandleFactory<H> for StaticHandles<H> {
    async fn build(&self) -> CoreResult<H> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.handles.clone())
    }
}

/// Handle factory that always fails with a setup error.
#[derive(Debug, Clone)]
pub struct FailingHandles {
    message: String,
}

impl FailingHandles {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl<H: Send + Sync + 'static> HandleFactory<H> for FailingHandles {
    async fn build(&self) -> CoreResult<H> {
        Err(CoreError::Setup(self.message.clone()))
    }
}

/// Record store that keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<Vec<InstallationRecord>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `persist` fail with the given message.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Records persisted so far.
    pub fn records(&self) -> Vec<InstallationRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn persist(&self, record: &InstallationRecord) -> CoreResult<()> {
        if let Some(message) = self.simulate_failure.read().clone() {
            return Err(CoreError::Persist(message));
        }
        self.records.write().push(record.clone());
        Ok(())
    }
}
