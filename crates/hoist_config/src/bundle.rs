//! Sources of the three configuration layers.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::ClusterConfig;

/// Default cluster name used for a generated base.
pub const DEFAULT_CLUSTER_NAME: &str = "hoist";

/// Provides the generated base and the optional override documents as text.
pub trait ConfigBundle: Send + Sync {
    /// The generated base configuration.
    ///
    /// The base is parsed into [`ClusterConfig`] before any patch is applied,
    /// so fields the model does not know are dropped from the written file.
    fn base(&self) -> ConfigResult<String>;

    /// Vendor override patch, if any.
    fn vendor_overrides(&self) -> ConfigResult<Option<String>>;

    /// End-user override patch, if any.
    fn end_user_overrides(&self) -> ConfigResult<Option<String>>;
}

/// In-memory bundle.
#[derive(Debug, Clone, Default)]
pub struct StaticBundle {
    base: Option<String>,
    vendor: Option<String>,
    end_user: Option<String>,
}

impl StaticBundle {
    /// A bundle whose base is [`ClusterConfig::generated`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_vendor(mut self, patch: impl Into<String>) -> Self {
        self.vendor = Some(patch.into());
        self
    }

    pub fn with_end_user(mut self, patch: impl Into<String>) -> Self {
        self.end_user = Some(patch.into());
        self
    }
}

impl ConfigBundle for StaticBundle {
    fn base(&self) -> ConfigResult<String> {
        match &self.base {
            Some(base) => Ok(base.clone()),
            None => ClusterConfig::generated(DEFAULT_CLUSTER_NAME).to_yaml(),
        }
    }

    fn vendor_overrides(&self) -> ConfigResult<Option<String>> {
        Ok(self.vendor.clone())
    }

    fn end_user_overrides(&self) -> ConfigResult<Option<String>> {
        Ok(self.end_user.clone())
    }
}

/// Bundle read from a directory holding `base.yaml`, `vendor.yaml` and
/// `overrides.yaml`. Every file is optional; a missing base falls back to the
/// generated default.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    dir: PathBuf,
}

impl DirectoryBundle {
    pub const BASE_FILE: &'static str = "base.yaml";
    pub const VENDOR_FILE: &'static str = "vendor.yaml";
    pub const END_USER_FILE: &'static str = "overrides.yaml";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ConfigBundle for DirectoryBundle {
    fn base(&self) -> ConfigResult<String> {
        match read_optional(&self.dir.join(Self::BASE_FILE))? {
            Some(base) => Ok(base),
            None => ClusterConfig::generated(DEFAULT_CLUSTER_NAME).to_yaml(),
        }
    }

    fn vendor_overrides(&self) -> ConfigResult<Option<String>> {
        read_optional(&self.dir.join(Self::VENDOR_FILE))
    }

    fn end_user_overrides(&self) -> ConfigResult<Option<String>> {
        read_optional(&self.dir.join(Self::END_USER_FILE))
    }
}

/// Read a file, treating a missing file as `None`.
pub fn read_optional(path: &Path) -> ConfigResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            debug!("Read {:?}", path);
            Ok(Some(content))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io(e)),
    }
}
