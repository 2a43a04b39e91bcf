//! Install plan file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use hoist_core::InstallerConfig;

/// What `hoist install` runs.
///
/// ```yaml
/// installer:
///   maxConcurrentInstalls: 2
/// workdir: /var/lib/hoist/work
/// components:
///   - name: storage
///     program: /usr/local/bin/install-storage
///     args: ["--wait"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlan {
    #[serde(default)]
    pub installer: InstallerConfig,

    /// Working directory for every component; created if missing.
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Environment shared by every component.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    pub components: Vec<ComponentPlan>,
}

/// One component, installed by running a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPlan {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl InstallPlan {
    /// Load and check a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid plan {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let plan: InstallPlan = serde_yaml::from_str(content)?;
        plan.check()?;
        Ok(plan)
    }

    fn check(&self) -> Result<()> {
        if self.components.is_empty() {
            anyhow::bail!("plan lists no components");
        }
        let mut seen = std::collections::HashSet::new();
        for component in &self.components {
            if component.name.trim().is_empty() {
                anyhow::bail!("component with program '{}' has no name", component.program);
            }
            if !seen.insert(component.name.as_str()) {
                anyhow::bail!("component '{}' is listed twice", component.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let plan = InstallPlan::parse(
            r#"
installer:
  maxConcurrentInstalls: 2
  recordName: edge
env:
  CLUSTER: edge
components:
  - name: storage
    program: /bin/sh
    args: ["-c", "echo storage"]
  - name: network
    program: /bin/true
"#,
        )
        .unwrap();

        assert_eq!(plan.installer.max_concurrent_installs, Some(2));
        assert_eq!(plan.installer.record_name.as_deref(), Some("edge"));
        assert_eq!(plan.env["CLUSTER"], "edge");
        assert_eq!(plan.components.len(), 2);
        assert!(plan.components[1].args.is_empty());
        assert!(plan.workdir.is_none());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = InstallPlan::parse(
            r#"
components:
  - name: storage
    program: /bin/true
  - name: storage
    program: /bin/false
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_rejects_empty_plan() {
        assert!(InstallPlan::parse("components: []\n").is_err());
    }
}
