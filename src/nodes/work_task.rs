//! Work-task node: creates a task with the Work Task collaborator and
//! suspends until its completion callback, identically to agent sessions
//! but keyed on the task id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collab::Wake;
use crate::error::NodeError;
use crate::model::{TaskRequest, WaitDescriptor};

use super::agent_session::resolve_text;
use super::{parse_config, EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkTaskConfig {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

pub struct WorkTaskHandler;

#[async_trait]
impl NodeHandler for WorkTaskHandler {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        let config: WorkTaskConfig = parse_config(ctx.node)?;
        let description =
            resolve_text(&config.description, &config.description_from, ctx, "work_task")?;

        Ok(NodeOutcome::Suspend(WaitDescriptor::Task {
            request: TaskRequest {
                agent_id: config.agent_id,
                description,
                project_id: config.project_id,
            },
            task_id: None,
        }))
    }

    async fn resume(
        &self,
        ctx: &mut HandlerContext<'_>,
        wake: &Wake,
    ) -> Result<NodeOutcome, NodeError> {
        match wake {
            Wake::TaskCompleted { outcome, .. } => match outcome {
                Ok(summary) => {
                    ctx.context.set(ctx.node.id.clone(), summary.clone());
                    Ok(NodeOutcome::Advance(EdgeSelector::Single))
                }
                Err(error) => Err(NodeError::Collaborator(error.clone())),
            },
            other => Err(NodeError::UnexpectedWake {
                node_id: ctx.node.id.clone(),
                detail: format!("{:?}", other),
            }),
        }
    }
}
