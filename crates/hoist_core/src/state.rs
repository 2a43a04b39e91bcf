//! Installation state: overall status, component statuses and the log tail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of the installation or of a single component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Not started yet
    Pending,
    /// In progress
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
}

impl Default for InstallState {
    fn default() -> Self {
        Self::Pending
    }
}

impl InstallState {
    /// Succeeded and Failed end an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Succeeded | InstallState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallState::Pending => "pending",
            InstallState::Running => "running",
            InstallState::Succeeded => "succeeded",
            InstallState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A state plus a human-readable description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub state: InstallState,
    pub description: String,
    pub last_updated: DateTime<Utc>,
}

impl Status {
    pub fn new(state: InstallState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
            last_updated: Utc::now(),
        }
    }

    pub fn pending(description: impl Into<String>) -> Self {
        Self::new(InstallState::Pending, description)
    }

    pub fn running(description: impl Into<String>) -> Self {
        Self::new(InstallState::Running, description)
    }

    pub fn succeeded(description: impl Into<String>) -> Self {
        Self::new(InstallState::Succeeded, description)
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self::new(InstallState::Failed, description)
    }
}

/// Status of one installable component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub status: Status,
}

impl Component {
    /// A freshly registered component.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::pending(""),
        }
    }
}

/// Everything a status poller can see about the current attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallationState {
    /// Overall status, `None` until the first install attempt starts
    pub status: Option<Status>,
    /// Components in registration order
    pub components: Vec<Component>,
    /// Bounded tail of the install log
    pub logs: String,
}

impl InstallationState {
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().map_or(false, |s| s.state.is_terminal())
    }
}

/// A single progress update from a component installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub component: String,
    pub state: InstallState,
    pub description: String,
}

impl ProgressEvent {
    pub fn new(
        component: impl Into<String>,
        state: InstallState,
        description: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            state,
            description: description.into(),
        }
    }
}

/// State written to the durable record store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Installed,
}

/// Final record of a successful installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallationRecord {
    pub id: Uuid,
    pub name: String,
    pub state: RecordState,
    pub components: Vec<Component>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl InstallationRecord {
    pub fn installed(
        name: impl Into<String>,
        components: Vec<Component>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: RecordState::Installed,
            components,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!InstallState::Pending.is_terminal());
        assert!(!InstallState::Running.is_terminal());
        assert!(InstallState::Succeeded.is_terminal());
        assert!(InstallState::Failed.is_terminal());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&InstallState::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }

    #[test]
    fn test_component_lookup() {
        let state = InstallationState {
            status: None,
            components: vec![Component::new("openebs"), Component::new("registry")],
            logs: String::new(),
        };

        assert_eq!(state.component("registry").unwrap().status.state, InstallState::Pending);
        assert!(state.component("velero").is_none());
        assert!(!state.is_terminal());
    }
}
