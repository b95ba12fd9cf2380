use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{RunRecord, Workflow};

use super::{RunStore, StoreError, WorkflowStore};

/// In-memory store, for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, StoreError> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workflows)
    }

    async fn delete_workflow(&self, id: &str) -> Result<(), StoreError> {
        self.workflows.write().await.remove(id);
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn save_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.runs
            .write()
            .await
            .insert(record.run.id.clone(), record.clone());
        Ok(())
    }

    async fn load_run(&self, id: &str) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, StoreError> {
        let mut records: Vec<RunRecord> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.run.workflow_id == workflow_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.run.created_at.cmp(&b.run.created_at));
        Ok(records)
    }

    async fn load_open_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut records: Vec<RunRecord> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| !r.run.status.is_terminal())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.run.created_at.cmp(&b.run.created_at));
        Ok(records)
    }
}
