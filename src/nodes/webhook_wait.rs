//! Webhook-wait node: suspends until an external event matching a
//! correlation key is delivered, with an optional timeout edge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collab::Wake;
use crate::error::NodeError;
use crate::model::WaitDescriptor;

use super::{parse_config, EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookWaitConfig {
    /// Literal correlation key, e.g. `"repo:owner/name#42"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_key: Option<String>,
    /// Context selector resolving to the correlation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Edge label to follow on timeout; without it a timeout fails the
    /// branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_edge: Option<String>,
}

pub struct WebhookWaitHandler;

#[async_trait]
impl NodeHandler for WebhookWaitHandler {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        let config: WebhookWaitConfig = parse_config(ctx.node)?;

        let correlation_key = match (&config.correlation_key, &config.correlation_from) {
            (Some(key), _) => key.clone(),
            (None, Some(selector)) => {
                let value = ctx.context.get(selector).ok_or_else(|| {
                    NodeError::ContextValueNotFound(selector.clone())
                })?;
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        NodeError::TypeError(format!(
                            "correlation selector '{}' must resolve to a string",
                            selector
                        ))
                    })?
            }
            (None, None) => {
                return Err(NodeError::ConfigError(
                    "webhook_wait needs either 'correlation_key' or 'correlation_from'".into(),
                ))
            }
        };

        Ok(NodeOutcome::Suspend(WaitDescriptor::Webhook {
            correlation_key,
            timeout_secs: config.timeout_secs,
            timeout_edge: config.timeout_edge,
            waiter_id: None,
        }))
    }

    async fn resume(
        &self,
        ctx: &mut HandlerContext<'_>,
        wake: &Wake,
    ) -> Result<NodeOutcome, NodeError> {
        match wake {
            Wake::WebhookEvent { payload, .. } => {
                ctx.context.set(ctx.node.id.clone(), payload.clone());
                Ok(NodeOutcome::Advance(EdgeSelector::Single))
            }
            Wake::WebhookTimeout { .. } => {
                let config: WebhookWaitConfig = parse_config(ctx.node)?;
                match config.timeout_edge {
                    Some(label) => Ok(NodeOutcome::Advance(EdgeSelector::Labeled(label))),
                    None => Err(NodeError::WaitTimeout(config.timeout_secs.unwrap_or(0))),
                }
            }
            other => Err(NodeError::UnexpectedWake {
                node_id: ctx.node.id.clone(),
                detail: format!("{:?}", other),
            }),
        }
    }
}
