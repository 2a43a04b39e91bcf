//! # hoist_config
//!
//! Layered cluster configuration for hoist.
//!
//! A generated base configuration is combined with an optional vendor patch
//! and an optional end-user patch, in that order. Patches may only replace a
//! fixed set of spec sections (see [`PATCHABLE_SECTIONS`]); everything else
//! they contain is ignored. The result is written in the shape older readers
//! understand (see [`legacy`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use hoist_config::{ConfigWriter, StaticBundle, DEFAULT_CONFIG_PATH};
//!
//! let bundle = StaticBundle::new()
//!     .with_vendor("spec:\n  telemetry:\n    enabled: false\n")
//!     .with_end_user("spec:\n  api:\n    port: 7443\n");
//!
//! ConfigWriter::create(DEFAULT_CONFIG_PATH, &bundle)?;
//! # Ok::<(), hoist_config::ConfigError>(())
//! ```

pub mod bundle;
pub mod error;
pub mod legacy;
pub mod model;
pub mod patch;
pub mod writer;

pub use bundle::{ConfigBundle, DirectoryBundle, StaticBundle};
pub use error::{ConfigError, ConfigResult};
pub use legacy::{from_legacy, to_legacy, to_legacy_yaml, LEGACY_API_VERSION};
pub use model::{
    ApiSpec, ClusterConfig, ClusterSpec, Metadata, NetworkSpec, StorageBackend, StorageSpec,
    TelemetrySpec, API_VERSION, KIND,
};
pub use patch::{apply_patch, merge, PATCHABLE_SECTIONS};
pub use writer::{ConfigReader, ConfigWriter, DEFAULT_CONFIG_PATH};
