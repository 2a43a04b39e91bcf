//! Reading and writing the cluster config file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::bundle::ConfigBundle;
use crate::error::{ConfigError, ConfigResult};
use crate::legacy;
use crate::model::ClusterConfig;
use crate::patch;

/// Well-known location of the cluster config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hoist/cluster.yaml";

/// Writer for the cluster config file.
pub struct ConfigWriter;

impl ConfigWriter {
    /// Merge the bundle's layers: base, vendor, end-user.
    pub fn build(bundle: &dyn ConfigBundle) -> ConfigResult<ClusterConfig> {
        let base = ClusterConfig::from_yaml(&bundle.base()?)?;
        let vendor = bundle.vendor_overrides()?;
        let end_user = bundle.end_user_overrides()?;
        patch::merge(base, vendor.as_deref(), end_user.as_deref())
    }

    /// Merge the bundle and render it as the file would be written.
    pub fn render(bundle: &dyn ConfigBundle) -> ConfigResult<String> {
        legacy::to_legacy_yaml(&Self::build(bundle)?)
    }

    /// Build the merged config and write it to a new file at `path`.
    ///
    /// Fails with [`ConfigError::AlreadyExists`] if anything is already at
    /// `path`; the existing file is left untouched.
    pub fn create(path: impl AsRef<Path>, bundle: &dyn ConfigBundle) -> ConfigResult<ClusterConfig> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        let config = Self::build(bundle)?;
        let content = legacy::to_legacy_yaml(&config)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ConfigError::AlreadyExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;

        info!("Wrote cluster config to {:?}", path);
        Ok(config)
    }

    /// Apply one more patch to the config file at `path` and rewrite it.
    pub fn patch_existing(path: impl AsRef<Path>, patch: &str) -> ConfigResult<ClusterConfig> {
        let path = path.as_ref();
        let current = ConfigReader::read(path)?;
        let patched = patch::apply_patch(current, patch)?;

        let content = legacy::to_legacy_yaml(&patched)?;
        fs::write(path, content)?;

        info!("Patched cluster config at {:?}", path);
        Ok(patched)
    }
}

/// Reader for the cluster config file.
pub struct ConfigReader;

impl ConfigReader {
    /// Read the config file, upgrading it from the legacy shape.
    pub fn read(path: impl AsRef<Path>) -> ConfigResult<ClusterConfig> {
        let path = path.as_ref();
        debug!("Reading cluster config from {:?}", path);

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        legacy::from_legacy(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::StaticBundle;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_legacy_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc").join("cluster.yaml");

        let config = ConfigWriter::create(&path, &StaticBundle::new()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains(&format!("apiVersion: {}", legacy::LEGACY_API_VERSION)));
        assert_eq!(ConfigReader::read(&path).unwrap(), config);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cluster.yaml");
        fs::write(&path, "hand written\n").unwrap();

        let err = ConfigWriter::create(&path, &StaticBundle::new()).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hand written\n");
    }

    #[test]
    fn test_base_fields_outside_model_are_dropped() {
        let base = format!(
            "{}spec:\n  featureGates: [Everything]\n",
            "apiVersion: hoist.dev/v1beta2\nkind: ClusterConfig\nmetadata:\n  name: edge\n"
        );
        let rendered = ConfigWriter::render(&StaticBundle::new().with_base(base)).unwrap();
        assert!(rendered.contains("name: edge"));
        assert!(!rendered.contains("featureGates"));
    }

    #[test]
    fn test_patch_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = ConfigWriter::patch_existing(temp.path().join("missing.yaml"), "").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
