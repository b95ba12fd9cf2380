//! Delay node: suspends on a timer computed from a fixed duration or a
//! context expression. A zero-second delay still suspends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collab::Wake;
use crate::error::NodeError;
use crate::model::WaitDescriptor;

use super::{parse_config, EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    /// Context selector resolving to a number of seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_from: Option<String>,
}

pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        let config: DelayConfig = parse_config(ctx.node)?;

        let seconds = match (config.seconds, &config.seconds_from) {
            (Some(seconds), _) => seconds,
            (None, Some(selector)) => {
                let value = ctx.context.get(selector).ok_or_else(|| {
                    NodeError::ContextValueNotFound(selector.clone())
                })?;
                value.as_u64().ok_or_else(|| {
                    NodeError::TypeError(format!(
                        "delay selector '{}' must resolve to a non-negative integer",
                        selector
                    ))
                })?
            }
            (None, None) => {
                return Err(NodeError::ConfigError(
                    "delay needs either 'seconds' or 'seconds_from'".into(),
                ))
            }
        };

        let fire_at_ms = ctx.runtime.time_provider.now_millis() + (seconds as i64) * 1000;
        Ok(NodeOutcome::Suspend(WaitDescriptor::Timer {
            fire_at_ms,
            timer_id: None,
        }))
    }

    async fn resume(
        &self,
        ctx: &mut HandlerContext<'_>,
        wake: &Wake,
    ) -> Result<NodeOutcome, NodeError> {
        match wake {
            Wake::TimerFired { .. } => Ok(NodeOutcome::Advance(EdgeSelector::Single)),
            other => Err(NodeError::UnexpectedWake {
                node_id: ctx.node.id.clone(),
                detail: format!("{:?}", other),
            }),
        }
    }
}
