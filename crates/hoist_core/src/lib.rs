//! # hoist_core
//!
//! Installation orchestration engine for hoist.
//!
//! This crate tracks an installation attempt and drives component installers
//! through it.
//!
//! # Architecture
//!
//! - **Status Store**: concurrency-safe record of overall status, component
//!   statuses and a bounded log tail
//! - **Progress Aggregator**: single consumer applying installer progress to
//!   the store in arrival order
//! - **Installer**: the install state machine, with panic recovery
//! - **Mock**: scripted installers and in-memory stores for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hoist_core::{Installer, InstallerConfig, StatusStore};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(StatusStore::new());
//! let installer = Installer::new(InstallerConfig::default(), store.clone(), handles, records)
//!     .component(Arc::new(OpenEbs))
//!     .component(Arc::new(Registry));
//!
//! // Poll `store.get()` from elsewhere while this runs
//! installer.install(CancellationToken::new()).await?;
//! ```

pub mod component;
pub mod error;
pub mod installer;
pub mod mock;
pub mod progress;
pub mod recovery;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use component::{ComponentInstaller, HandleFactory, RecordStore};
pub use error::{CoreError, CoreResult, InstallStage};
pub use installer::{Installer, InstallerConfig};
pub use progress::{progress_channel, ProgressAggregator, ProgressReceiver, ProgressReporter, ProgressSender};
pub use state::{
    Component, InstallState, InstallationRecord, InstallationState, ProgressEvent, RecordState,
    Status,
};
pub use store::{StatusStore, LOG_TRUNCATION_MARKER, MAX_LOG_SIZE};

pub use tokio_util::sync::CancellationToken;
