//! Start, end, parallel, and join nodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

use super::{EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

/// Start node: no side effect, advances along its single outgoing edge.
/// The trigger input is already seeded into the context.
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    async fn execute(&self, _ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::Advance(EdgeSelector::Single))
    }
}

/// End node: terminal, completes the owning branch.
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    async fn execute(&self, _ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::Complete)
    }
}

/// Parallel node: advances along every outgoing edge at once; the
/// scheduler forks one branch per edge.
pub struct ParallelHandler;

#[async_trait]
impl NodeHandler for ParallelHandler {
    async fn execute(&self, _ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::Advance(EdgeSelector::All))
    }
}

/// Join node config: the explicit reference to the parallel node this
/// join recombines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub joins_parallel_node_id: String,
}

/// Join nodes are rendezvous markers; the scheduler intercepts branch
/// arrival and never dispatches this handler.
pub struct JoinMarker;

#[async_trait]
impl NodeHandler for JoinMarker {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        Err(NodeError::ConfigError(format!(
            "join node '{}' is a rendezvous marker and is scheduled by the engine",
            ctx.node.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::model::NodeType;
    use crate::nodes::testing::{node, run_handler};
    use serde_json::json;

    #[tokio::test]
    async fn test_start_advances() {
        let node = node(NodeType::Start, json!({}));
        let mut ctx = RunContext::new();
        let outcome = run_handler(&StartHandler, &node, &mut ctx).await.unwrap();
        assert_eq!(outcome, NodeOutcome::Advance(EdgeSelector::Single));
    }

    #[tokio::test]
    async fn test_end_completes() {
        let node = node(NodeType::End, json!({}));
        let mut ctx = RunContext::new();
        let outcome = run_handler(&EndHandler, &node, &mut ctx).await.unwrap();
        assert_eq!(outcome, NodeOutcome::Complete);
    }

    #[tokio::test]
    async fn test_parallel_advances_all() {
        let node = node(NodeType::Parallel, json!({}));
        let mut ctx = RunContext::new();
        let outcome = run_handler(&ParallelHandler, &node, &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome, NodeOutcome::Advance(EdgeSelector::All));
    }

    #[tokio::test]
    async fn test_join_marker_refuses_execution() {
        let node = node(NodeType::Join, json!({"joins_parallel_node_id": "p"}));
        let mut ctx = RunContext::new();
        let err = run_handler(&JoinMarker, &node, &mut ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::ConfigError(_)));
    }
}
