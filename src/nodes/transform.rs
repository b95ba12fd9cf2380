//! Transform node: pure, synchronous context rewrite via a configured
//! mapping. Never suspends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;

use super::{parse_config, EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

/// One mapping entry: write `target` from a context selector or a literal
/// value. An unresolved selector writes null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub assignments: Vec<Assignment>,
}

pub struct TransformHandler;

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        let config: TransformConfig = parse_config(ctx.node)?;

        for assignment in &config.assignments {
            let value = match (&assignment.from, &assignment.value) {
                (Some(selector), _) => {
                    ctx.context.get(selector).cloned().unwrap_or(Value::Null)
                }
                (None, Some(literal)) => literal.clone(),
                (None, None) => {
                    return Err(NodeError::ConfigError(format!(
                        "assignment '{}' needs either 'from' or 'value'",
                        assignment.target
                    )))
                }
            };
            ctx.context.set(assignment.target.clone(), value);
        }

        Ok(NodeOutcome::Advance(EdgeSelector::Single))
    }
}
