//! Output shape for readers that only know the previous document version.
//!
//! Older readers decode strictly and expect:
//! - `apiVersion` set to [`LEGACY_API_VERSION`],
//! - `spec.workerProfiles` as a list of `{name, values}`,
//! - no null values and no empty mappings or sequences.
//!
//! None of this changes the meaning of any field they understand.

use serde_yaml::{Mapping, Value};

use crate::error::ConfigResult;
use crate::model::{ClusterConfig, LegacyWorkerProfile, WorkerProfile, API_VERSION};

/// Document version understood by older readers.
pub const LEGACY_API_VERSION: &str = "hoist.dev/v1beta1";

/// Reshape a config into the legacy document.
pub fn to_legacy(config: &ClusterConfig) -> ConfigResult<Value> {
    let mut doc = serde_yaml::to_value(config)?;

    if let Value::Mapping(root) = &mut doc {
        root.insert(
            Value::from("apiVersion"),
            Value::from(LEGACY_API_VERSION),
        );
        if let Some(Value::Mapping(spec)) = root.get_mut("spec") {
            if let Some(profiles) = spec.get_mut("workerProfiles") {
                let map: std::collections::BTreeMap<String, WorkerProfile> =
                    serde_yaml::from_value(std::mem::take(profiles))?;
                let list: Vec<LegacyWorkerProfile> = map
                    .into_iter()
                    .map(|(name, values)| LegacyWorkerProfile { name, values })
                    .collect();
                *profiles = serde_yaml::to_value(list)?;
            }
        }
    }

    prune(&mut doc);
    Ok(doc)
}

/// Render the legacy document as YAML text.
pub fn to_legacy_yaml(config: &ClusterConfig) -> ConfigResult<String> {
    Ok(serde_yaml::to_string(&to_legacy(config)?)?)
}

/// Read a document written in either shape, upgrading it to the current
/// version.
pub fn from_legacy(content: &str) -> ConfigResult<ClusterConfig> {
    let mut config = ClusterConfig::from_yaml(content)?;
    config.api_version = API_VERSION.to_string();
    Ok(config)
}

fn prune(value: &mut Value) {
    match value {
        Value::Mapping(map) => prune_mapping(map),
        Value::Sequence(items) => {
            items.iter_mut().for_each(prune);
            items.retain(|item| !is_empty(item));
        }
        Value::Tagged(tagged) => prune(&mut tagged.value),
        _ => {}
    }
}

fn prune_mapping(map: &mut Mapping) {
    let entries = std::mem::take(map);
    *map = entries
        .into_iter()
        .filter_map(|(key, mut value)| {
            prune(&mut value);
            (!is_empty(&value)).then_some((key, value))
        })
        .collect();
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Mapping(map) => map.is_empty(),
        Value::Sequence(items) => items.is_empty(),
        _ => false,
    }
}
