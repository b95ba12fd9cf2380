use thiserror::Error;

/// Node-level errors raised by handler execution.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Context value not found: {0}")]
    ContextValueNotFound(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("No outgoing edge matches label '{label}' on node {node_id}")]
    NoMatchingEdge { node_id: String, label: String },
    #[error("Collaborator error: {0}")]
    Collaborator(String),
    #[error("Wait timed out after {0}s")]
    WaitTimeout(u64),
    #[error("Unexpected wake for node {node_id}: {detail}")]
    UnexpectedWake { node_id: String, detail: String },
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}
