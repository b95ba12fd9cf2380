//! Engine-level error types.

use thiserror::Error;

use super::{NodeError, ValidationError};
use crate::store::StoreError;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("Workflow '{id}' is not active (status: {status})")]
    WorkflowNotActive { id: String, status: String },
    #[error("Run not found: {0}")]
    RunNotFound(String),
    #[error("Run '{0}' is already terminal")]
    RunAlreadyTerminal(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
    #[error("Node execution error: node={node_id}, error={error}")]
    NodeExecutionError { node_id: String, error: String },
    #[error("Max steps exceeded for branch {branch_id}: {limit}")]
    MaxStepsExceeded { branch_id: String, limit: u32 },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WorkflowError {
    pub(crate) fn from_node_error(node_id: &str, error: &NodeError) -> Self {
        WorkflowError::NodeExecutionError {
            node_id: node_id.to_string(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_display() {
        assert_eq!(
            WorkflowError::WorkflowNotFound("wf".into()).to_string(),
            "Workflow not found: wf"
        );
        assert_eq!(
            WorkflowError::WorkflowNotActive {
                id: "wf".into(),
                status: "draft".into()
            }
            .to_string(),
            "Workflow 'wf' is not active (status: draft)"
        );
        assert_eq!(
            WorkflowError::RunNotFound("r".into()).to_string(),
            "Run not found: r"
        );
        assert_eq!(
            WorkflowError::MaxStepsExceeded {
                branch_id: "b".into(),
                limit: 500
            }
            .to_string(),
            "Max steps exceeded for branch b: 500"
        );
    }

    #[test]
    fn test_workflow_error_from_validation() {
        let err: WorkflowError = ValidationError::NoStartNode.into();
        assert!(matches!(err, WorkflowError::ValidationFailed(_)));
        assert!(err.to_string().contains("No start node"));
    }

    #[test]
    fn test_workflow_error_from_node_error() {
        let node_err = NodeError::ConfigError("bad".into());
        let err = WorkflowError::from_node_error("n1", &node_err);
        let msg = err.to_string();
        assert!(msg.contains("n1"));
        assert!(msg.contains("bad"));
    }
}
