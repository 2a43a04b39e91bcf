//! Override patches.
//!
//! A patch is a partial cluster config. Only the sections listed in
//! [`PATCHABLE_SECTIONS`] are read from it; each one present replaces the
//! matching section of the base wholesale. Anything else in the patch is
//! ignored.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    deserialize_optional_worker_profiles, ApiSpec, ClusterConfig, NetworkSpec, StorageSpec,
    TelemetrySpec, WorkerProfile,
};

/// Spec sections a patch may override.
pub const PATCHABLE_SECTIONS: &[&str] = &["api", "network", "storage", "workerProfiles", "telemetry"];

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    #[serde(default)]
    spec: Option<SpecPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecPatch {
    #[serde(default)]
    api: Option<ApiSpec>,
    #[serde(default)]
    network: Option<NetworkSpec>,
    #[serde(default)]
    storage: Option<StorageSpec>,
    #[serde(default, deserialize_with = "deserialize_optional_worker_profiles")]
    worker_profiles: Option<BTreeMap<String, WorkerProfile>>,
    #[serde(default)]
    telemetry: Option<TelemetrySpec>,
}

/// Apply one patch document to `base`.
///
/// An empty patch, or one with no whitelisted sections, returns `base`
/// unchanged.
pub fn apply_patch(mut base: ClusterConfig, patch: &str) -> ConfigResult<ClusterConfig> {
    let value: serde_yaml::Value = serde_yaml::from_str(patch)
        .map_err(|e| ConfigError::Parse(format!("override patch: {}", e)))?;
    if value.is_null() {
        return Ok(base);
    }

    let patch: ConfigPatch = serde_yaml::from_value(value)
        .map_err(|e| ConfigError::Parse(format!("override patch: {}", e)))?;
    let Some(spec) = patch.spec else {
        debug!("Patch has no spec, nothing to apply");
        return Ok(base);
    };

    let mut applied = Vec::new();
    if let Some(api) = spec.api {
        base.spec.api = Some(api);
        applied.push("api");
    }
    if let Some(network) = spec.network {
        base.spec.network = Some(network);
        applied.push("network");
    }
    if let Some(storage) = spec.storage {
        base.spec.storage = Some(storage);
        applied.push("storage");
    }
    if let Some(worker_profiles) = spec.worker_profiles {
        base.spec.worker_profiles = worker_profiles;
        applied.push("workerProfiles");
    }
    if let Some(telemetry) = spec.telemetry {
        base.spec.telemetry = Some(telemetry);
        applied.push("telemetry");
    }

    debug!("Applied patch sections: {:?}", applied);
    Ok(base)
}

/// Merge the layers in order: base, then vendor, then end-user.
pub fn merge(
    base: ClusterConfig,
    vendor: Option<&str>,
    end_user: Option<&str>,
) -> ConfigResult<ClusterConfig> {
    let mut config = base;
    if let Some(vendor) = vendor {
        debug!("Applying vendor overrides");
        config = apply_patch(config, vendor)?;
    }
    if let Some(end_user) = end_user {
        debug!("Applying end-user overrides");
        config = apply_patch(config, end_user)?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StorageBackend;

    fn base() -> ClusterConfig {
        ClusterConfig::generated("edge")
    }

    #[test]
    fn test_empty_patch_is_identity() {
        assert_eq!(apply_patch(base(), "").unwrap(), base());
        assert_eq!(apply_patch(base(), "# nothing here\n").unwrap(), base());
    }

    #[test]
    fn test_unknown_fields_are_dropped() {
        let patch = r#"
kind: SomethingElse
metadata:
  name: renamed
spec:
  images:
    repository: evil.example.com
    defaultPullPolicy: Always
  install:
    users:
      etcdUser: root
      kineUser: root
      kubeApiServerUser: root
      kubeSchedulerUser: root
  somethingNew: true
"#;
        assert_eq!(apply_patch(base(), patch).unwrap(), base());
    }

    #[test]
    fn test_section_replaced_wholesale() {
        let patch = r#"
spec:
  network:
    provider: kuberouter
    podCidr: 10.10.0.0/16
    serviceCidr: 10.20.0.0/16
"#;
        let merged = apply_patch(base(), patch).unwrap();
        let network = merged.spec.network.clone().unwrap();
        assert_eq!(network.provider, "kuberouter");
        assert_eq!(network.pod_cidr, "10.10.0.0/16");
        assert_eq!(network.cluster_domain, "cluster.local");

        assert_eq!(merged.spec.api, base().spec.api);
        assert_eq!(merged.spec.storage, base().spec.storage);
        assert_eq!(merged.spec.images, base().spec.images);
        assert_eq!(merged.metadata, base().metadata);
    }

    #[test]
    fn test_end_user_wins_over_vendor() {
        let vendor = r#"
spec:
  storage:
    type: kine
    kine:
      dataSource: sqlite:///vendor.db
"#;
        let end_user = r#"
spec:
  storage:
    type: kine
    kine:
      dataSource: sqlite:///user.db
  telemetry:
    enabled: false
"#;
        let merged = merge(base(), Some(vendor), Some(end_user)).unwrap();
        let storage = merged.spec.storage.clone().unwrap();
        assert_eq!(storage.backend, StorageBackend::Kine);
        assert_eq!(storage.kine.unwrap().data_source, "sqlite:///user.db");
        assert_eq!(merged.spec.telemetry.clone().unwrap().enabled, false);
        assert_eq!(merged.spec.network, base().spec.network);
        assert_eq!(merged.spec.api, base().spec.api);
    }

    #[test]
    fn test_vendor_only_layer() {
        let vendor = r#"
spec:
  api:
    port: 7443
    sans: [cluster.example.com]
"#;
        let merged = merge(base(), Some(vendor), None).unwrap();
        let api = merged.spec.api.unwrap();
        assert_eq!(api.port, 7443);
        assert_eq!(api.sans, vec!["cluster.example.com"]);
    }

    #[test]
    fn test_malformed_whitelisted_section_errors() {
        let patch = "spec:\n  network: not-a-mapping\n";
        assert!(matches!(
            apply_patch(base(), patch),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_null_section_leaves_base() {
        let patch = "spec:\n  telemetry: null\n  workerProfiles: null\n";
        assert_eq!(apply_patch(base(), patch).unwrap(), base());
    }
}
