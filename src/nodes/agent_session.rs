//! Agent-session node: starts a session with the Agent Session
//! collaborator and suspends until its completion callback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collab::Wake;
use crate::error::NodeError;
use crate::model::{SessionRequest, WaitDescriptor};

use super::{parse_config, EdgeSelector, HandlerContext, NodeHandler, NodeOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSessionConfig {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Context selector resolving to the prompt text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_from: Option<String>,
    #[serde(default)]
    pub config: Value,
}

pub(crate) fn resolve_text(
    literal: &Option<String>,
    selector: &Option<String>,
    ctx: &HandlerContext<'_>,
    what: &str,
) -> Result<String, NodeError> {
    match (literal, selector) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(selector)) => {
            let value = ctx
                .context
                .get(selector)
                .ok_or_else(|| NodeError::ContextValueNotFound(selector.clone()))?;
            Ok(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        (None, None) => Err(NodeError::ConfigError(format!(
            "{} node '{}' needs either a literal or a selector",
            what, ctx.node.id
        ))),
    }
}

pub struct AgentSessionHandler;

#[async_trait]
impl NodeHandler for AgentSessionHandler {
    async fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<NodeOutcome, NodeError> {
        let config: AgentSessionConfig = parse_config(ctx.node)?;
        let prompt = resolve_text(&config.prompt, &config.prompt_from, ctx, "agent_session")?;

        Ok(NodeOutcome::Suspend(WaitDescriptor::Session {
            request: SessionRequest {
                agent_id: config.agent_id,
                prompt,
                config: config.config,
            },
            session_id: None,
        }))
    }

    async fn resume(
        &self,
        ctx: &mut HandlerContext<'_>,
        wake: &Wake,
    ) -> Result<NodeOutcome, NodeError> {
        match wake {
            Wake::SessionCompleted { outcome, .. } => match outcome {
                Ok(result) => {
                    ctx.context.set(ctx.node.id.clone(), result.clone());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::model::NodeType;
    use crate::nodes::testing::{node, resume_handler, run_handler};
    use serde_json::json;

    #[tokio::test]
    async fn test_suspends_with_resolved_request() {
        let node = node(
            NodeType::AgentSession,
            json!({"agent_id": "agent-7", "prompt_from": "trigger.question"}),
        );
        let mut ctx = RunContext::seeded(json!({"question": "summarize the issue"}));
        match run_handler(&AgentSessionHandler, &node, &mut ctx)
            .await
            .unwrap()
        {
            NodeOutcome::Suspend(WaitDescriptor::Session { request, session_id }) => {
                assert_eq!(request.agent_id, "agent-7");
                assert_eq!(request.prompt, "summarize the issue");
                assert!(session_id.is_none());
            }
            other => panic!("Expected session suspension, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_prompt_fails() {
        let node = node(NodeType::AgentSession, json!({"agent_id": "a"}));
        let mut ctx = RunContext::new();
        let err = run_handler(&AgentSessionHandler, &node, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_result_written_under_node_id() {
        let node = node(
            NodeType::AgentSession,
            json!({"agent_id": "a", "prompt": "go"}),
        );
        let mut ctx = RunContext::new();
        let wake = Wake::SessionCompleted {
            session_id: "sess-1".into(),
            outcome: Ok(json!({"text": "done"})),
        };
        let outcome = resume_handler(&AgentSessionHandler, &node, &mut ctx, &wake)
            .await
            .unwrap();
        assert_eq!(outcome, NodeOutcome::Advance(EdgeSelector::Single));
        assert_eq!(ctx.get("n1.text"), Some(&json!("done")));
    }

    #[tokio::test]
    async fn test_session_error_fails_branch() {
        let node = node(
            NodeType::AgentSession,
            json!({"agent_id": "a", "prompt": "go"}),
        );
        let mut ctx = RunContext::new();
        let wake = Wake::SessionCompleted {
            session_id: "sess-1".into(),
            outcome: Err("model unavailable".into()),
        };
        let err = resume_handler(&AgentSessionHandler, &node, &mut ctx, &wake)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Collaborator(_)));
    }
}
