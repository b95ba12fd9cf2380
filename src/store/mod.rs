//! Durable storage of workflow definitions and run state.
//!
//! The engine persists a [`RunRecord`](crate::model::RunRecord) on every
//! branch transition, before acting on external side effects, so a crash
//! never loses a state transition. `load_open_runs` feeds startup
//! recovery.

mod file;
mod memory;

use async_trait::async_trait;

use crate::model::{RunRecord, Workflow};

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Record corrupted: {0}")]
    Corrupted(String),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;
    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, StoreError>;
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;
    async fn delete_workflow(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save_run(&self, record: &RunRecord) -> Result<(), StoreError>;
    async fn load_run(&self, id: &str) -> Result<Option<RunRecord>, StoreError>;
    async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, StoreError>;
    /// All runs not in a terminal status, for startup recovery.
    async fn load_open_runs(&self) -> Result<Vec<RunRecord>, StoreError>;
}

/// Combined storage surface the engine is built over.
pub trait Store: WorkflowStore + RunStore {}

impl<T: WorkflowStore + RunStore> Store for T {}
