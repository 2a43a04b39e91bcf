//! Installation record kept as a JSON file in the state directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use hoist_core::{CoreError, CoreResult, InstallationRecord, RecordStore};

/// Writes the record to `<state dir>/installation.json`.
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub const FILE_NAME: &'static str = "installation.json";

    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn persist(&self, record: &InstallationRecord) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| CoreError::Persist(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Persist(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| CoreError::Persist(format!("{}: {}", self.path.display(), e)))?;

        info!("Recorded installation {} at {:?}", record.id, self.path);
        Ok(())
    }
}
