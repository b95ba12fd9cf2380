//! Condition node: evaluates a boolean predicate and picks the outgoing
//! edge whose label matches the result.

use async_trait::async_trait;

use crate::error::NodeError;
use crate::evaluator::{evaluate_predicate, Predicate};

use super::{parse_config, EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        let predicate: Predicate = parse_config(ctx.node)?;
        let result = evaluate_predicate(&predicate, ctx.context);
        let label = if result { "true" } else { "false" };
        Ok(NodeOutcome::Advance(EdgeSelector::Labeled(label.into())))
    }
}
