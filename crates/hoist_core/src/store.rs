//! In-memory status store shared between the installer, the progress
//! aggregator and status pollers.
//!
//! Every operation takes the lock for its own duration only and never does
//! I/O or awaits while holding it. Reads return independent copies.

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::state::{Component, InstallationState, Status};

/// Ceiling for the stored log tail, in bytes.
pub const MAX_LOG_SIZE: usize = 100 * 1024;

/// Prefix of the log tail once older output has been dropped.
pub const LOG_TRUNCATION_MARKER: &str = "... (earlier logs truncated) ...\n";

/// Concurrency-safe record of one installation attempt.
#[derive(Debug, Default)]
pub struct StatusStore {
    state: RwLock<InstallationState>,
}

impl StatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the whole state.
    pub fn get(&self) -> InstallationState {
        self.state.read().clone()
    }

    /// Start over for a new attempt.
    pub fn reset(&self) {
        *self.state.write() = InstallationState::default();
    }

    /// Current overall status, if any.
    pub fn status(&self) -> Option<Status> {
        self.state.read().status.clone()
    }

    /// Replace the overall status.
    ///
    /// Fails with [`CoreError::TerminalState`] once the attempt has
    /// succeeded or failed.
    pub fn set_status(&self, status: Status) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.is_terminal() {
            return Err(CoreError::TerminalState);
        }
        state.status = Some(status);
        Ok(())
    }

    /// Update the description of the overall status, keeping its state.
    pub fn set_status_description(&self, description: impl Into<String>) -> CoreResult<()> {
        let mut state = self.state.write();
        let status = state.status.as_mut().ok_or(CoreError::UnsetState)?;
        if status.state.is_terminal() {
            return Err(CoreError::TerminalState);
        }
        status.description = description.into();
        status.last_updated = Utc::now();
        Ok(())
    }

    /// Register a component as Pending. Registering a known name is a no-op.
    pub fn register_component(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.write();
        if state.components.iter().any(|c| c.name == name) {
            debug!("Component {} already registered", name);
            return;
        }
        state.components.push(Component::new(name));
    }

    /// Replace the status of a registered component.
    pub fn set_component_status(&self, name: &str, status: Status) -> CoreResult<()> {
        let mut state = self.state.write();
        let component = state
            .components
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::ComponentNotFound(name.to_string()))?;
        component.status = status;
        Ok(())
    }

    /// Append a line to the log tail, dropping the oldest output past
    /// [`MAX_LOG_SIZE`].
    pub fn add_logs(&self, line: impl AsRef<str>) {
        let mut state = self.state.write();
        append_bounded(&mut state.logs, line.as_ref(), MAX_LOG_SIZE);
    }

    /// Copy of the log tail.
    pub fn logs(&self) -> String {
        self.state.read().logs.clone()
    }
}

fn append_bounded(logs: &mut String, line: &str, limit: usize) {
    logs.push_str(line);
    logs.push('\n');

    if logs.len() <= limit {
        return;
    }

    let keep = limit.saturating_sub(LOG_TRUNCATION_MARKER.len());
    let mut start = logs.len() - keep;
    while !logs.is_char_boundary(start) {
        start += 1;
    }

    let tail = logs.split_off(start);
    logs.clear();
    logs.push_str(LOG_TRUNCATION_MARKER);
    logs.push_str(&tail);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InstallState;
    use std::sync::Arc;

    #[test]
    fn test_register_and_set_component_status() {
        let store = StatusStore::new();
        store.register_component("x");
        store
            .set_component_status("x", Status::running("installing"))
            .unwrap();

        let state = store.get();
        let matching: Vec<_> = state.components.iter().filter(|c| c.name == "x").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].status.state, InstallState::Running);
        assert_eq!(matching[0].status.description, "installing");
    }

    #[test]
    fn test_set_unregistered_component_fails() {
        let store = StatusStore::new();
        let err = store
            .set_component_status("y", Status::running("installing"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ComponentNotFound(name) if name == "y"));
        assert!(store.get().components.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let store = StatusStore::new();
        store.register_component("registry");
        store.register_component("admin-console");
        store.register_component("registry");

        let names: Vec<_> = store.get().components.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["registry", "admin-console"]);
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = StatusStore::new();
        store.set_status(Status::running("starting")).unwrap();
        store.register_component("a");
        store.add_logs("first");

        let mut snapshot = store.get();
        snapshot.status.as_mut().unwrap().description = "tampered".to_string();
        snapshot.components[0].status.state = InstallState::Failed;
        snapshot.components.push(Component::new("ghost"));
        snapshot.logs.push_str("tampered");

        let fresh = store.get();
        assert_eq!(fresh.status.clone().unwrap().description, "starting");
        assert_eq!(fresh.components.len(), 1);
        assert_eq!(fresh.components[0].status.state, InstallState::Pending);
        assert_eq!(fresh.logs, "first\n");
    }

    #[test]
    fn test_description_requires_status() {
        let store = StatusStore::new();
        assert!(matches!(
            store.set_status_description("anything"),
            Err(CoreError::UnsetState)
        ));

        store.set_status(Status::running("starting")).unwrap();
        store.set_status_description("Installing openebs").unwrap();
        let status = store.status().unwrap();
        assert_eq!(status.state, InstallState::Running);
        assert_eq!(status.description, "Installing openebs");
    }

    #[test]
    fn test_terminal_status_is_final() {
        let store = StatusStore::new();
        store.set_status(Status::running("starting")).unwrap();
        store.set_status(Status::failed("boom")).unwrap();

        assert!(matches!(
            store.set_status(Status::succeeded("done")),
            Err(CoreError::TerminalState)
        ));
        assert!(matches!(
            store.set_status_description("late"),
            Err(CoreError::TerminalState)
        ));

        store.add_logs("still allowed");
        assert_eq!(store.status().unwrap().description, "boom");
        assert!(store.logs().ends_with("still allowed\n"));
    }

    #[test]
    fn test_reset_clears_state() {
        let store = StatusStore::new();
        store.set_status(Status::succeeded("done")).unwrap();
        store.register_component("a");
        store.add_logs("line");

        store.reset();
        assert_eq!(store.get(), InstallationState::default());
        store.set_status(Status::running("again")).unwrap();
    }

    #[test]
    fn test_logs_stay_under_ceiling() {
        let store = StatusStore::new();
        let line = "x".repeat(1000);
        for i in 0..250 {
            store.add_logs(format!("{i:04} {line}"));
            assert!(store.logs().len() <= MAX_LOG_SIZE);
        }

        store.add_logs("the most recent line");
        let logs = store.logs();
        assert!(logs.len() <= MAX_LOG_SIZE);
        assert!(logs.starts_with(LOG_TRUNCATION_MARKER));
        assert!(logs.ends_with("the most recent line\n"));
        assert!(!logs.contains("0000 "));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut logs = String::new();
        for _ in 0..100 {
            append_bounded(&mut logs, "héllo wörld ✓", 64);
            assert!(logs.len() <= 64);
        }
        assert!(logs.starts_with(LOG_TRUNCATION_MARKER));
        assert!(logs.ends_with("héllo wörld ✓\n"));
    }

    #[test]
    fn test_concurrent_log_appends() {
        let store = Arc::new(StatusStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.add_logs(format!("thread {t} line {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.logs().lines().count(), 800);
    }
}
