use std::collections::HashMap;

use crate::error::ValidationError;
use crate::model::{Edge, Node, NodeType, Workflow};
use crate::nodes::control_flow::JoinConfig;

use super::validator::validate_workflow;

/// Adjacency view of a validated workflow, used by the scheduler.
///
/// Outgoing edges preserve definition order so parallel fan-out and edge
/// selection are deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    outgoing: HashMap<String, Vec<Edge>>,
    start_id: String,
    /// parallel node id -> its paired join node id
    joins: HashMap<String, String>,
}

impl Graph {
    /// Validate the workflow and build the adjacency view.
    pub fn build(workflow: &Workflow) -> Result<Self, ValidationError> {
        validate_workflow(workflow)?;

        let mut nodes = HashMap::new();
        let mut outgoing: HashMap<String, Vec<Edge>> = HashMap::new();
        let mut joins = HashMap::new();
        let mut start_id = None;

        for node in &workflow.nodes {
            if node.node_type == NodeType::Start {
                start_id = Some(node.id.clone());
            }
            if node.node_type == NodeType::Join {
                // Validation guarantees the config parses and the
                // reference resolves.
                if let Ok(config) = serde_json::from_value::<JoinConfig>(node.config.clone()) {
                    joins.insert(config.joins_parallel_node_id, node.id.clone());
                }
            }
            nodes.insert(node.id.clone(), node.clone());
            outgoing.entry(node.id.clone()).or_default();
        }

        for edge in &workflow.edges {
            outgoing
                .entry(edge.source.clone())
                .or_default()
                .push(edge.clone());
        }

        Ok(Graph {
            nodes,
            outgoing,
            start_id: start_id.ok_or(ValidationError::NoStartNode)?,
            joins,
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Outgoing edges of a node, in definition order.
    pub fn outgoing(&self, id: &str) -> &[Edge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn start_id(&self) -> &str {
        &self.start_id
    }

    /// The join node paired with a parallel node.
    pub fn join_for_parallel(&self, parallel_id: &str) -> Option<&str> {
        self.joins.get(parallel_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node, NodeType, Workflow, WorkflowStatus};
    use chrono::Utc;
    use serde_json::json;

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: "wf".into(),
            name: "test".into(),
            description: String::new(),
            agent_id: String::new(),
            status: WorkflowStatus::Draft,
            nodes,
            edges,
            max_concurrency: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_linear_graph() {
        let wf = workflow(
            vec![
                Node::new("s", NodeType::Start),
                Node::new("e", NodeType::End),
            ],
            vec![Edge::new("e1", "s", "e")],
        );
        let graph = Graph::build(&wf).unwrap();
        assert_eq!(graph.start_id(), "s");
        assert_eq!(graph.outgoing("s").len(), 1);
        assert_eq!(graph.outgoing("e").len(), 0);
        assert_eq!(graph.node("e").unwrap().node_type, NodeType::End);
    }

    #[test]
    fn test_outgoing_preserves_definition_order() {
        let wf = workflow(
            vec![
                Node::new("s", NodeType::Start),
                Node::new("p", NodeType::Parallel),
                Node::new("a", NodeType::Transform).with_config(json!({"assignments": []})),
                Node::new("b", NodeType::Transform).with_config(json!({"assignments": []})),
                Node::new("j", NodeType::Join)
                    .with_config(json!({"joins_parallel_node_id": "p"})),
                Node::new("e", NodeType::End),
            ],
            vec![
                Edge::new("e1", "s", "p"),
                Edge::new("e2", "p", "a"),
                Edge::new("e3", "p", "b"),
                Edge::new("e4", "a", "j"),
                Edge::new("e5", "b", "j"),
                Edge::new("e6", "j", "e"),
            ],
        );
        let graph = Graph::build(&wf).unwrap();
        let fanout: Vec<&str> = graph.outgoing("p").iter().map(|e| e.target.as_str()).collect();
        assert_eq!(fanout, vec!["a", "b"]);
        assert_eq!(graph.join_for_parallel("p"), Some("j"));
    }
}
