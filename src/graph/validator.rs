use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::ValidationError;
use crate::model::{NodeType, Workflow};
use crate::nodes::control_flow::JoinConfig;

/// Validate the structural invariants of a workflow graph.
///
/// Called on create/update and again before a workflow moves from draft to
/// active. Rejects with the first specific violation found.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    if workflow.max_concurrency < 1 {
        return Err(ValidationError::InvalidConcurrencyLimit);
    }

    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let mut start_id: Option<&str> = None;
    let mut has_end = false;
    for node in &workflow.nodes {
        match node.node_type {
            NodeType::Start => match start_id {
                None => start_id = Some(&node.id),
                Some(first) => {
                    return Err(ValidationError::MultipleStartNodes(
                        first.to_string(),
                        node.id.clone(),
                    ))
                }
            },
            NodeType::End => has_end = true,
            _ => {}
        }
    }
    let start_id = start_id.ok_or(ValidationError::NoStartNode)?;
    if !has_end {
        return Err(ValidationError::NoEndNode);
    }

    for edge in &workflow.edges {
        for endpoint in [&edge.source, &edge.target] {
            if workflow.node(endpoint).is_none() {
                return Err(ValidationError::UnknownEdgeEndpoint {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }

    let mut out_degree: HashMap<&str, usize> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for edge in &workflow.edges {
        *out_degree.entry(edge.source.as_str()).or_default() += 1;
        *in_degree.entry(edge.target.as_str()).or_default() += 1;
    }

    for node in &workflow.nodes {
        let outs = out_degree.get(node.id.as_str()).copied().unwrap_or(0);
        let ins = in_degree.get(node.id.as_str()).copied().unwrap_or(0);
        match node.node_type {
            NodeType::Start => {
                if ins > 0 {
                    return Err(ValidationError::StartHasIncomingEdges(node.id.clone()));
                }
                require_single_edge(&node.id, node.node_type, outs)?;
            }
            NodeType::End => {
                if outs > 0 {
                    return Err(ValidationError::EndHasOutgoingEdges(node.id.clone()));
                }
            }
            NodeType::Parallel => {
                if outs < 2 {
                    return Err(ValidationError::ParallelFanoutTooSmall(node.id.clone()));
                }
            }
            NodeType::Join => {
                if outs != 1 {
                    return Err(ValidationError::JoinFanoutInvalid(node.id.clone()));
                }
            }
            NodeType::Delay | NodeType::Transform | NodeType::AgentSession | NodeType::WorkTask => {
                require_single_edge(&node.id, node.node_type, outs)?;
            }
            // condition picks among labeled edges; webhook_wait may carry
            // an extra timeout edge
            NodeType::Condition | NodeType::WebhookWait => {}
        }
    }

    validate_join_pairing(workflow, &in_degree, &out_degree)?;

    // Reachability from start over the full edge set.
    let mut reachable = HashSet::new();
    reachable.insert(start_id);
    let mut queue = VecDeque::from([start_id]);
    while let Some(current) = queue.pop_front() {
        for edge in workflow.edges.iter().filter(|e| e.source == current) {
            if reachable.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    for node in &workflow.nodes {
        if !reachable.contains(node.id.as_str()) {
            return Err(ValidationError::UnreachableNode(node.id.clone()));
        }
    }

    // Acyclicity of the full edge set (cycles are a future extension).
    let mut graph: StableDiGraph<&str, ()> = StableDiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &workflow.nodes {
        index.insert(&node.id, graph.add_node(node.id.as_str()));
    }
    for edge in &workflow.edges {
        graph.add_edge(index[edge.source.as_str()], index[edge.target.as_str()], ());
    }
    if petgraph::algo::is_cyclic_directed(&graph) {
        return Err(ValidationError::CycleDetected);
    }

    Ok(())
}

fn require_single_edge(
    node_id: &str,
    node_type: NodeType,
    found: usize,
) -> Result<(), ValidationError> {
    if found != 1 {
        return Err(ValidationError::SingleEdgeRequired {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            found,
        });
    }
    Ok(())
}

/// Every parallel node must be referenced by exactly one join whose
/// in-degree matches the parallel's out-degree.
fn validate_join_pairing(
    workflow: &Workflow,
    in_degree: &HashMap<&str, usize>,
    out_degree: &HashMap<&str, usize>,
) -> Result<(), ValidationError> {
    let mut joins_by_parallel: HashMap<String, &str> = HashMap::new();

    for node in &workflow.nodes {
        if node.node_type != NodeType::Join {
            continue;
        }
        let config: JoinConfig = serde_json::from_value(node.config.clone()).map_err(|_| {
            ValidationError::BadJoinReference {
                join_id: node.id.clone(),
                parallel_id: String::new(),
            }
        })?;
        let parallel_id = config.joins_parallel_node_id;
        match workflow.node(&parallel_id) {
            Some(target) if target.node_type == NodeType::Parallel => {}
            _ => {
                return Err(ValidationError::BadJoinReference {
                    join_id: node.id.clone(),
                    parallel_id,
                })
            }
        }
        if joins_by_parallel.insert(parallel_id.clone(), &node.id).is_some() {
            return Err(ValidationError::DuplicateJoin(parallel_id));
        }

        let expected = out_degree.get(parallel_id.as_str()).copied().unwrap_or(0);
        let found = in_degree.get(node.id.as_str()).copied().unwrap_or(0);
        if expected != found {
            return Err(ValidationError::JoinArityMismatch {
                join_id: node.id.clone(),
                parallel_id,
                expected,
                found,
            });
        }
    }

    for node in &workflow.nodes {
        if node.node_type == NodeType::Parallel && !joins_by_parallel.contains_key(&node.id) {
            return Err(ValidationError::UnpairedParallel(node.id.clone()));
        }
    }

    Ok(())
}
