use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::model::{RunRecord, Workflow};

use super::{RunStore, StoreError, WorkflowStore};

/// File-backed store: one JSON document per workflow and per run under a
/// base directory.
pub struct FileStore {
    workflows_dir: PathBuf,
    runs_dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base = dir.as_ref().to_path_buf();
        let workflows_dir = base.join("workflows");
        let runs_dir = base.join("runs");
        for dir in [&workflows_dir, &runs_dir] {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::StorageError(e.to_string()))?;
        }
        Ok(Self {
            workflows_dir,
            runs_dir,
        })
    }

    fn workflow_path(&self, id: &str) -> PathBuf {
        self.workflows_dir.join(format!("{}.json", id))
    }

    fn run_path(&self, id: &str) -> PathBuf {
        self.runs_dir.join(format!("{}.json", id))
    }

    async fn write_json<T: serde::Serialize>(path: PathBuf, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        path: PathBuf,
    ) -> Result<Option<T>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::StorageError(e.to_string())),
        };
        let value =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        Ok(Some(value))
    }

    async fn read_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;
        let mut values = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(value) = Self::read_json(path).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

#[async_trait]
impl WorkflowStore for FileStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        Self::write_json(self.workflow_path(&workflow.id), workflow).await
    }

    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, StoreError> {
        Self::read_json(self.workflow_path(id)).await
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows: Vec<Workflow> = Self::read_dir(&self.workflows_dir).await?;
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workflows)
    }

    async fn delete_workflow(&self, id: &str) -> Result<(), StoreError> {
        let _ = tokio::fs::remove_file(self.workflow_path(id)).await;
        Ok(())
    }
}

#[async_trait]
impl RunStore for FileStore {
    async fn save_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        Self::write_json(self.run_path(&record.run.id), record).await
    }

    async fn load_run(&self, id: &str) -> Result<Option<RunRecord>, StoreError> {
        Self::read_json(self.run_path(id)).await
    }

    async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, StoreError> {
        let mut records: Vec<RunRecord> = Self::read_dir(&self.runs_dir).await?;
        records.retain(|r| r.run.workflow_id == workflow_id);
        records.sort_by(|a, b| a.run.created_at.cmp(&b.run.created_at));
        Ok(records)
    }

    async fn load_open_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut records: Vec<RunRecord> = Self::read_dir(&self.runs_dir).await?;
        records.retain(|r| !r.run.status.is_terminal());
        records.sort_by(|a, b| a.run.created_at.cmp(&b.run.created_at));
        Ok(records)
    }
}
