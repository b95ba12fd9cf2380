use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node type discriminant. One handler implementation exists per variant,
/// dispatched through the handler registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    AgentSession,
    WorkTask,
    Condition,
    Delay,
    WebhookWait,
    Transform,
    Parallel,
    Join,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::AgentSession => "agent_session",
            NodeType::WorkTask => "work_task",
            NodeType::Condition => "condition",
            NodeType::Delay => "delay",
            NodeType::WebhookWait => "webhook_wait",
            NodeType::Transform => "transform",
            NodeType::Parallel => "parallel",
            NodeType::Join => "join",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow lifecycle status. Only `Active` workflows may be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
        }
    }
}

/// A typed graph node. `config` is an opaque map interpreted by the
/// matching handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub config: Value,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Node {
            id: id.into(),
            node_type,
            label: String::new(),
            config: Value::Null,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A directed edge. `label` is used by `condition` nodes to pick an
/// outgoing edge and by `webhook_wait` timeout routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

fn default_max_concurrency() -> usize {
    1
}

/// Caller-supplied definition for creating or updating a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agent_id: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for WorkflowSpec {
    fn default() -> Self {
        WorkflowSpec {
            name: String::new(),
            description: String::new(),
            agent_id: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// A stored workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agent_id: String,
    pub status: WorkflowStatus,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_type == NodeType::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_serde_snake_case() {
        assert_eq!(
            serde_json::to_value(NodeType::AgentSession).unwrap(),
            serde_json::json!("agent_session")
        );
        let t: NodeType = serde_json::from_value(serde_json::json!("webhook_wait")).unwrap();
        assert_eq!(t, NodeType::WebhookWait);
    }

    #[test]
    fn test_node_type_display() {
        assert_eq!(NodeType::WorkTask.to_string(), "work_task");
        assert_eq!(NodeType::Join.to_string(), "join");
    }

    #[test]
    fn test_workflow_spec_defaults() {
        let spec: WorkflowSpec = serde_json::from_value(serde_json::json!({
            "name": "wf",
            "nodes": [],
            "edges": []
        }))
        .unwrap();
        assert_eq!(spec.max_concurrency, 1);
        assert!(spec.description.is_empty());
    }
}
