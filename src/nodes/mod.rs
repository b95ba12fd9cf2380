//! Node handlers.
//!
//! Each node type implements [`NodeHandler`]. Handlers are pure with
//! respect to external I/O: a suspending handler returns a fully-resolved
//! [`WaitDescriptor`] and the scheduler performs the collaborator
//! registration after persisting the suspension, so a crash never loses a
//! transition.

pub mod agent_session;
pub mod condition;
pub mod control_flow;
pub mod delay;
mod registry;
pub mod transform;
pub mod webhook_wait;
pub mod work_task;

use async_trait::async_trait;

use crate::collab::Wake;
use crate::context::RunContext;
use crate::error::NodeError;
use crate::model::{Node, WaitDescriptor};
use crate::runtime::RuntimeContext;

pub use registry::HandlerRegistry;

/// Which outgoing edge(s) a branch advances along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeSelector {
    /// The node's single outgoing edge.
    Single,
    /// The edge whose label matches, falling back to an edge labeled
    /// `"default"`.
    Labeled(String),
    /// Every outgoing edge; valid only for `parallel`.
    All,
}

/// Result of executing or resuming a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Advance(EdgeSelector),
    Suspend(WaitDescriptor),
    /// Terminal: the owning branch is completed (`end` nodes).
    Complete,
}

/// Execution context handed to a handler: the node, the branch's mutable
/// context, and engine runtime services.
pub struct HandlerContext<'a> {
    pub node: &'a Node,
    pub run_id: &'a str,
    pub branch_id: &'a str,
    pub context: &'a mut RunContext,
    pub runtime: &'a RuntimeContext,
}

/// Trait for node execution. One implementation per node type.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// First entry of a branch into the node.
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError>;

    /// Re-entry after a wake for a suspension this handler requested.
    /// Handlers that never suspend keep the default.
    async fn resume(
        &self,
        ctx: &mut HandlerContext<'_>,
        wake: &Wake,
    ) -> Result<NodeOutcome, NodeError> {
        let _ = wake;
        Err(NodeError::UnexpectedWake {
            node_id: ctx.node.id.clone(),
            detail: "handler does not suspend".into(),
        })
    }
}

pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    node: &Node,
) -> Result<T, NodeError> {
    serde_json::from_value(node.config.clone()).map_err(|e| {
        NodeError::ConfigError(format!("Invalid {} config: {}", node.node_type, e))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::NodeType;
    use serde_json::Value;

    pub fn node(node_type: NodeType, config: Value) -> Node {
        Node::new("n1", node_type).with_config(config)
    }

    pub async fn run_handler(
        handler: &dyn NodeHandler,
        node: &Node,
        context: &mut RunContext,
    ) -> Result<NodeOutcome, NodeError> {
        let runtime = RuntimeContext::default();
        let mut ctx = HandlerContext {
            node,
            run_id: "run-1",
            branch_id: "branch-1",
            context,
            runtime: &runtime,
        };
        handler.execute(&mut ctx).await
    }

    pub async fn resume_handler(
        handler: &dyn NodeHandler,
        node: &Node,
        context: &mut RunContext,
        wake: &Wake,
    ) -> Result<NodeOutcome, NodeError> {
        let runtime = RuntimeContext::default();
        let mut ctx = HandlerContext {
            node,
            run_id: "run-1",
            branch_id: "branch-1",
            context,
            runtime: &runtime,
        };
        handler.resume(&mut ctx, wake).await
    }
}
