//! Progress fan-in from component installers to the status store.
//!
//! Installers push [`ProgressEvent`]s into a bounded channel; a single
//! [`ProgressAggregator`] task drains it and applies each event to the
//! [`StatusStore`] in arrival order. The channel capacity is small so a slow
//! consumer throttles producers.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::state::{InstallState, ProgressEvent, Status};
use crate::store::StatusStore;

/// Default channel capacity. Producers wait for the consumer on every event.
pub const DEFAULT_PROGRESS_BUFFER: usize = 1;

/// Producer side of the progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
}

/// Consumer side of the progress channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::Receiver<ProgressEvent>,
}

/// Open a bounded progress channel. A zero capacity is raised to one.
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender { tx }, ProgressReceiver { rx })
}

impl ProgressSender {
    /// Send an event, waiting until the consumer has room for it.
    ///
    /// Returns `false` if the consumer is gone.
    pub async fn send(&self, event: ProgressEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// Single consumer that turns progress events into store mutations.
pub struct ProgressAggregator {
    store: Arc<StatusStore>,
}

impl ProgressAggregator {
    pub fn new(store: Arc<StatusStore>) -> Self {
        Self { store }
    }

    /// Run the consumer on its own task until every sender is dropped.
    pub fn spawn(store: Arc<StatusStore>, receiver: ProgressReceiver) -> JoinHandle<()> {
        let aggregator = Self::new(store);
        tokio::spawn(async move { aggregator.drain(receiver).await })
    }

    /// Apply events until the channel is closed by the producer side.
    pub async fn drain(&self, mut receiver: ProgressReceiver) {
        while let Some(event) = receiver.rx.recv().await {
            self.apply(event);
        }
        debug!("Progress channel closed");
    }

    fn apply(&self, event: ProgressEvent) {
        debug!(
            component = %event.component,
            state = %event.state,
            "{}",
            event.description
        );

        if event.state == InstallState::Running {
            let description = format!("{} {}", event.description, event.component);
            if let Err(e) = self.store.set_status_description(description) {
                warn!("Failed to update status description: {}", e);
            }
        }

        let status = Status::new(event.state, event.description);
        if let Err(e) = self.store.set_component_status(&event.component, status) {
            warn!(
                "Failed to record progress for component {}: {}",
                event.component, e
            );
        }
    }
}

/// Progress handle given to one component installer.
///
/// Stamps the component name on every event and remembers whether a terminal
/// event has been reported.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    component: String,
    sender: ProgressSender,
    store: Arc<StatusStore>,
    last: Arc<Mutex<Option<ProgressEvent>>>,
}

impl ProgressReporter {
    pub fn new(
        component: impl Into<String>,
        sender: ProgressSender,
        store: Arc<StatusStore>,
    ) -> Self {
        Self {
            component: component.into(),
            sender,
            store,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Report a state change for this component.
    pub async fn report(&self, state: InstallState, description: impl Into<String>) {
        let event = ProgressEvent::new(self.component.clone(), state, description);
        if self.sender.send(event.clone()).await {
            *self.last.lock() = Some(event);
        } else {
            warn!("Progress consumer gone, dropping update for {}", self.component);
        }
    }

    pub async fn running(&self, description: impl Into<String>) {
        self.report(InstallState::Running, description).await;
    }

    pub async fn succeeded(&self, description: impl Into<String>) {
        self.report(InstallState::Succeeded, description).await;
    }

    pub async fn failed(&self, description: impl Into<String>) {
        self.report(InstallState::Failed, description).await;
    }

    /// Append a line of installer output to the log tail.
    pub fn log(&self, line: impl AsRef<str>) {
        self.store
            .add_logs(format!("[{}] {}", self.component, line.as_ref()));
    }

    /// Last state successfully reported, if any.
    pub fn last_state(&self) -> Option<InstallState> {
        self.last.lock().as_ref().map(|event| event.state)
    }

    /// Last event successfully reported, if any.
    pub fn last_event(&self) -> Option<ProgressEvent> {
        self.last.lock().clone()
    }

    /// Whether a Succeeded or Failed event has been reported.
    pub fn reported_terminal(&self) -> bool {
        self.last_state().map_or(false, |s| s.is_terminal())
    }
}
