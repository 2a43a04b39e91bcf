//! Cluster configuration document.
//!
//! Keys are camelCase on disk. Worker profiles are keyed by name in memory;
//! the list form written for older readers is accepted on input too.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Current document version.
pub const API_VERSION: &str = "hoist.dev/v1beta2";

/// Document kind.
pub const KIND: &str = "ClusterConfig";

/// Settings of one worker profile, passed through to the kubelet.
pub type WorkerProfile = BTreeMap<String, serde_yaml::Value>;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: ClusterSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Cluster settings.
///
/// `api`, `network`, `storage`, `worker_profiles` and `telemetry` may be
/// overridden by patches; `images` and `install` are generated only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_worker_profiles"
    )]
    pub worker_profiles: BTreeMap<String, WorkerProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<ImagesSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallSpec>,
}

/// API server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sans: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

fn default_api_port() -> u16 {
    6443
}

/// Cluster networking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub provider: String,
    pub pod_cidr: String,
    pub service_cidr: String,
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_local_load_balancing: Option<NodeLocalLoadBalancing>,
}

fn default_cluster_domain() -> String {
    "cluster.local".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLocalLoadBalancing {
    pub enabled: bool,
}

/// Control plane storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    #[serde(rename = "type")]
    pub backend: StorageBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<EtcdSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kine: Option<KineSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Etcd,
    Kine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KineSpec {
    pub data_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySpec {
    pub enabled: bool,
}

/// Image source for system components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesSpec {
    pub repository: String,
    pub default_pull_policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallSpec {
    pub users: SystemUsers,
}

/// Unix users the control plane processes run as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemUsers {
    pub etcd_user: String,
    pub kine_user: String,
    pub kube_api_server_user: String,
    pub kube_scheduler_user: String,
}

/// Worker profile entry as written for older readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyWorkerProfile {
    pub name: String,
    #[serde(default)]
    pub values: WorkerProfile,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkerProfiles {
    Map(BTreeMap<String, WorkerProfile>),
    List(Vec<LegacyWorkerProfile>),
}

impl WorkerProfiles {
    fn into_map(self) -> BTreeMap<String, WorkerProfile> {
        match self {
            WorkerProfiles::Map(map) => map,
            WorkerProfiles::List(list) => list.into_iter().map(|p| (p.name, p.values)).collect(),
        }
    }
}

/// Accepts worker profiles as a name-keyed map or a `[{name, values}]` list.
pub(crate) fn deserialize_optional_worker_profiles<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, WorkerProfile>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<WorkerProfiles>::deserialize(deserializer)?.map(WorkerProfiles::into_map))
}

fn deserialize_worker_profiles<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, WorkerProfile>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_worker_profiles(deserializer)?.unwrap_or_default())
}

impl ClusterConfig {
    /// The generated default configuration for a cluster.
    pub fn generated(name: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: Metadata {
                name: name.into(),
                labels: BTreeMap::new(),
            },
            spec: ClusterSpec {
                api: Some(ApiSpec {
                    address: None,
                    port: default_api_port(),
                    sans: Vec::new(),
                    extra_args: BTreeMap::new(),
                }),
                network: Some(NetworkSpec {
                    provider: "calico".to_string(),
                    pod_cidr: "10.244.0.0/16".to_string(),
                    service_cidr: "10.96.0.0/12".to_string(),
                    cluster_domain: default_cluster_domain(),
                    node_local_load_balancing: None,
                }),
                storage: Some(StorageSpec {
                    backend: StorageBackend::Etcd,
                    etcd: None,
                    kine: None,
                }),
                worker_profiles: BTreeMap::new(),
                telemetry: Some(TelemetrySpec { enabled: true }),
                images: Some(ImagesSpec {
                    repository: "registry.hoist.dev".to_string(),
                    default_pull_policy: "IfNotPresent".to_string(),
                }),
                install: Some(InstallSpec {
                    users: SystemUsers {
                        etcd_user: "etcd".to_string(),
                        kine_user: "kube-apiserver".to_string(),
                        kube_api_server_user: "kube-apiserver".to_string(),
                        kube_scheduler_user: "kube-scheduler".to_string(),
                    },
                }),
            },
        }
    }

    /// Parse a document in either the current or the legacy shape.
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("cluster config: {}", e)))?;
        if config.kind != KIND {
            return Err(ConfigError::Parse(format!(
                "expected kind {}, found {}",
                KIND, config.kind
            )));
        }
        Ok(config)
    }

    /// Serialize in the current shape.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
