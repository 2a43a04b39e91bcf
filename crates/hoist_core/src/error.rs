//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Install stages, used to prefix errors with where they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    BuildHandles,
    InstallComponents,
    PersistRecord,
}

impl InstallStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStage::BuildHandles => "build handles",
            InstallStage::InstallComponents => "install components",
            InstallStage::PersistRecord => "persist installation record",
        }
    }
}

impl std::fmt::Display for InstallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Status is unset")]
    UnsetState,

    #[error("Status is already terminal")]
    TerminalState,

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Component install failed: {component} - {message}")]
    ComponentFailed { component: String, message: String },

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Installation cancelled")]
    Cancelled,

    #[error("Installation panicked: {message}")]
    Panicked { message: String, backtrace: String },

    #[error("{stage}: {source}")]
    Stage {
        stage: InstallStage,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Wrap this error with the stage it occurred in.
    pub fn at(self, stage: InstallStage) -> Self {
        CoreError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, with stage prefixes peeled off.
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Adds a stage prefix to the error side of a result.
pub trait StageExt<T> {
    fn stage(self, stage: InstallStage) -> CoreResult<T>;
}

impl<T> StageExt<T> for CoreResult<T> {
    fn stage(self, stage: InstallStage) -> CoreResult<T> {
        self.map_err(|e| e.at(stage))
    }
}
