//! Fork/join semantics and concurrency limits.

mod common;

use agentflow::{
    BranchStatus, ConcurrencyScope, Edge, EngineConfig, EngineEvent, Node, NodeType, RunStatus,
};
use common::*;
use serde_json::json;

#[tokio::test]
async fn join_fires_only_after_all_branches_arrive() {
    let h = harness();
    let workflow = create_active(&h.engine, fork_join_spec()).await;

    let run = h.engine.trigger(&workflow.id, json!({})).await.unwrap();

    // All three session branches suspend; the run parks.
    let record = wait_for_status(&h.engine, &run.id, RunStatus::Paused).await;
    assert_eq!(
        record
            .branches
            .iter()
            .filter(|b| b.status == BranchStatus::Suspended)
            .count(),
        3
    );
    assert_eq!(record.joins.len(), 1);
    assert!(record.joins[0].arrivals.is_empty());
    let started = h.sessions.started();
    assert_eq!(started.len(), 3);

    // Two of three arrivals leave the join pending.
    h.sessions.complete(&started[0].0, Ok(json!({"r": "a"})));
    h.sessions.complete(&started[1].0, Ok(json!({"r": "b"})));
    let record = wait_until(&h.engine, &run.id, |r| {
        r.joins.first().map(|j| j.arrivals.len()) == Some(2)
    })
    .await;
    assert!(!record.run.status.is_terminal());
    assert_eq!(record.joins[0].expected, 3);

    // Third arrival fires the join and the run completes.
    h.sessions.complete(&started[2].0, Ok(json!({"r": "c"})));
    let record = h.engine.wait_for_run(&run.id).await.unwrap();
    assert_eq!(record.run.status, RunStatus::Completed);
    assert!(record.joins.is_empty());

    // Merged context carries every sibling's output.
    assert_eq!(record.run.context.get("sess_a.r"), Some(&json!("a")));
    assert_eq!(record.run.context.get("sess_b.r"), Some(&json!("b")));
    assert_eq!(record.run.context.get("sess_c.r"), Some(&json!("c")));

    // Siblings and the forking branch are joined; exactly one branch
    // completed (the continuation).
    let joined = record
        .branches
        .iter()
        .filter(|b| b.status == BranchStatus::Joined)
        .count();
    let completed = record
        .branches
        .iter()
        .filter(|b| b.status == BranchStatus::Completed)
        .count();
    assert_eq!(joined, 4);
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn join_merge_later_siblings_overwrite_earlier() {
    let h = harness();
    let mut nodes = vec![
        Node::new("start", NodeType::Start),
        Node::new("fork", NodeType::Parallel),
        Node::new("join", NodeType::Join).with_config(json!({"joins_parallel_node_id": "fork"})),
        Node::new("end", NodeType::End),
    ];
    let mut edges = vec![
        Edge::new("e0", "start", "fork"),
        Edge::new("ej", "join", "end"),
    ];
    // Every branch writes the same key; spawn order decides the winner.
    for (i, name) in ["first", "second", "third"].iter().enumerate() {
        let node_id = format!("t{}", i);
        nodes.push(Node::new(&node_id, NodeType::Transform).with_config(json!({
            "assignments": [
                {"target": "winner", "value": name},
                {"target": format!("mark_{}", i), "value": true}
            ]
        })));
        edges.push(Edge::new(format!("ef{}", i), "fork", &node_id));
        edges.push(Edge::new(format!("eb{}", i), &node_id, "join"));
    }

    let workflow = create_active(&h.engine, spec(nodes, edges)).await;
    let run = h.engine.trigger(&workflow.id, json!({})).await.unwrap();
    let record = h.engine.wait_for_run(&run.id).await.unwrap();

    assert_eq!(record.run.status, RunStatus::Completed);
    assert_eq!(record.run.context.get("winner"), Some(&json!("third")));
    for i in 0..3 {
        assert_eq!(
            record.run.context.get(&format!("mark_{}", i)),
            Some(&json!(true))
        );
    }
}

#[tokio::test]
async fn max_concurrency_one_activates_in_spawn_order() {
    let h = harness();
    let mut spec = fork_join_spec();
    spec.max_concurrency = 1;
    let workflow = create_active(&h.engine, spec).await;

    let run = h.engine.trigger(&workflow.id, json!({})).await.unwrap();
    wait_for_status(&h.engine, &run.id, RunStatus::Paused).await;

    // Suspending frees the slot, so all three sessions start, strictly in
    // spawn order.
    let prompts: Vec<String> = h
        .sessions
        .started()
        .into_iter()
        .map(|(_, request)| request.prompt)
        .collect();
    assert_eq!(prompts, vec!["a", "b", "c"]);

    for (session_id, _) in h.sessions.started() {
        h.sessions.complete(&session_id, Ok(json!({})));
    }
    let record = h.engine.wait_for_run(&run.id).await.unwrap();
    assert_eq!(record.run.status, RunStatus::Completed);
}

#[tokio::test]
async fn max_concurrency_one_serializes_compute_branches() {
    let h = harness();
    let mut events = h.engine.subscribe();

    let mut nodes = vec![
        Node::new("start", NodeType::Start),
        Node::new("fork", NodeType::Parallel),
        Node::new("join", NodeType::Join).with_config(json!({"joins_parallel_node_id": "fork"})),
        Node::new("end", NodeType::End),
    ];
    let mut edges = vec![
        Edge::new("e0", "start", "fork"),
        Edge::new("ej", "join", "end"),
    ];
    // Two transform steps per branch; with one slot, a branch must finish
    // both before the next branch starts.
    for branch in ["a", "b", "c"] {
        let first = format!("{}_1", branch);
        let second = format!("{}_2", branch);
        for node_id in [&first, &second] {
            nodes.push(Node::new(node_id, NodeType::Transform).with_config(
                json!({"assignments": [{"target": node_id, "value": true}]}),
            ));
        }
        edges.push(Edge::new(format!("ef_{}", branch), "fork", &first));
        edges.push(Edge::new(format!("em_{}", branch), &first, &second));
        edges.push(Edge::new(format!("eb_{}", branch), &second, "join"));
    }

    let mut spec = spec(nodes, edges);
    spec.max_concurrency = 1;
    let workflow = create_active(&h.engine, spec).await;

    let run = h.engine.trigger(&workflow.id, json!({})).await.unwrap();
    let record = h.engine.wait_for_run(&run.id).await.unwrap();
    assert_eq!(record.run.status, RunStatus::Completed);

    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::NodeStarted { node_id, .. } = event {
            if node_id.len() == 3 && node_id.as_bytes()[1] == b'_' {
                order.push(node_id);
            }
        }
    }
    assert_eq!(order, vec!["a_1", "a_2", "b_1", "b_2", "c_1", "c_2"]);
}

#[tokio::test]
async fn per_workflow_scope_queues_excess_runs() {
    let h = harness_with(
        None,
        EngineConfig {
            concurrency_scope: ConcurrencyScope::PerWorkflow,
            ..EngineConfig::default()
        },
    );
    let mut spec = spec(
        vec![
            Node::new("start", NodeType::Start),
            Node::new("sess", NodeType::AgentSession)
                .with_config(json!({"agent_id": "a", "prompt": "hold"})),
            Node::new("end", NodeType::End),
        ],
        vec![
            Edge::new("e1", "start", "sess"),
            Edge::new("e2", "sess", "end"),
        ],
    );
    spec.max_concurrency = 1;
    let workflow = create_active(&h.engine, spec).await;

    let first = h.engine.trigger(&workflow.id, json!({})).await.unwrap();
    wait_for_status(&h.engine, &first.id, RunStatus::Paused).await;

    // Second trigger queues instead of starting.
    let second = h.engine.trigger(&workflow.id, json!({})).await.unwrap();
    assert_eq!(second.status, RunStatus::Pending);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let record = h.engine.get_run(&second.id).await.unwrap();
    assert_eq!(record.run.status, RunStatus::Pending);
    assert_eq!(h.sessions.started().len(), 1);

    // Completing the first run starts the queued one.
    let started = h.sessions.started();
    h.sessions.complete(&started[0].0, Ok(json!({})));
    let record = h.engine.wait_for_run(&first.id).await.unwrap();
    assert_eq!(record.run.status, RunStatus::Completed);

    wait_for_status(&h.engine, &second.id, RunStatus::Paused).await;
    let started = h.sessions.started();
    assert_eq!(started.len(), 2);
    h.sessions.complete(&started[1].0, Ok(json!({})));
    let record = h.engine.wait_for_run(&second.id).await.unwrap();
    assert_eq!(record.run.status, RunStatus::Completed);
}
