use thiserror::Error;

/// Structural defects detected before a workflow may become active.
///
/// Each variant names the specific violation so callers can surface it
/// verbatim at workflow-activation time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No start node found")]
    NoStartNode,
    #[error("Multiple start nodes found: {0} and {1}")]
    MultipleStartNodes(String, String),
    #[error("No end node found")]
    NoEndNode,
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("Edge '{edge_id}' references unknown node: {node_id}")]
    UnknownEdgeEndpoint { edge_id: String, node_id: String },
    #[error("Start node '{0}' must not have incoming edges")]
    StartHasIncomingEdges(String),
    #[error("End node '{0}' must not have outgoing edges")]
    EndHasOutgoingEdges(String),
    #[error("Node '{0}' is unreachable from the start node")]
    UnreachableNode(String),
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Parallel node '{0}' must have at least two outgoing edges")]
    ParallelFanoutTooSmall(String),
    #[error("Parallel node '{0}' has no matching join node")]
    UnpairedParallel(String),
    #[error("Join node '{join_id}' references unknown parallel node: {parallel_id}")]
    BadJoinReference { join_id: String, parallel_id: String },
    #[error("Parallel node '{0}' is referenced by more than one join node")]
    DuplicateJoin(String),
    #[error(
        "Join node '{join_id}' expects {expected} incoming edges to match \
         parallel node '{parallel_id}', found {found}"
    )]
    JoinArityMismatch {
        join_id: String,
        parallel_id: String,
        expected: usize,
        found: usize,
    },
    #[error("Join node '{0}' must have exactly one outgoing edge")]
    JoinFanoutInvalid(String),
    #[error("Node '{node_id}' of type {node_type} must have exactly one outgoing edge, found {found}")]
    SingleEdgeRequired {
        node_id: String,
        node_type: String,
        found: usize,
    },
    #[error("Workflow max_concurrency must be at least 1")]
    InvalidConcurrencyLimit,
}
