//! Shared harness for engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agentflow::{
    Edge, Engine, EngineConfig, FakeSessionService, FakeTaskService, FakeWebhookBus,
    ManualTimerService, Node, NodeType, RunRecord, RunStatus, Store, Workflow, WorkflowSpec,
};
use serde_json::json;

pub struct Harness {
    pub engine: Engine,
    pub sessions: Arc<FakeSessionService>,
    pub tasks: Arc<FakeTaskService>,
    pub webhooks: Arc<FakeWebhookBus>,
    pub timers: Arc<ManualTimerService>,
}

/// Engine over an in-memory store with fully manual collaborators.
pub fn harness() -> Harness {
    harness_with(None, EngineConfig::default())
}

pub fn harness_with(store: Option<Arc<dyn Store>>, config: EngineConfig) -> Harness {
    let mut builder = Engine::builder().config(config);
    if let Some(store) = store {
        builder = builder.store(store);
    }
    let sink = builder.wake_sink();
    let sessions = Arc::new(FakeSessionService::new(sink.clone()));
    let tasks = Arc::new(FakeTaskService::new(sink.clone()));
    let webhooks = Arc::new(FakeWebhookBus::new(sink.clone()));
    let timers = Arc::new(ManualTimerService::new(sink));
    let engine = builder
        .sessions(sessions.clone())
        .tasks(tasks.clone())
        .webhooks(webhooks.clone())
        .timers(timers.clone())
        .build();
    Harness {
        engine,
        sessions,
        tasks,
        webhooks,
        timers,
    }
}

pub fn spec(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowSpec {
    WorkflowSpec {
        name: "test".into(),
        nodes,
        edges,
        max_concurrency: 4,
        ..Default::default()
    }
}

pub fn linear_spec() -> WorkflowSpec {
    spec(
        vec![
            Node::new("start", NodeType::Start),
            Node::new("end", NodeType::End),
        ],
        vec![Edge::new("e1", "start", "end")],
    )
}

/// Fork three agent-session branches into a join.
pub fn fork_join_spec() -> WorkflowSpec {
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
    for name in ["a", "b", "c"] {
        let node_id = format!("sess_{}", name);
        nodes.push(
            Node::new(&node_id, NodeType::AgentSession)
                .with_config(json!({"agent_id": "agent-1", "prompt": name})),
        );
        edges.push(Edge::new(format!("ef_{}", name), "fork", &node_id));
        edges.push(Edge::new(format!("eb_{}", name), &node_id, "join"));
    }
    spec(nodes, edges)
}

pub async fn create_active(engine: &Engine, spec: WorkflowSpec) -> Workflow {
    let workflow = engine.create_workflow(spec).await.unwrap();
    engine.activate_workflow(&workflow.id).await.unwrap()
}

/// Poll until the run reports the wanted status, panicking after 5s.
pub async fn wait_for_status(engine: &Engine, run_id: &str, status: RunStatus) -> RunRecord {
    for _ in 0..500 {
        let record = engine.get_run(run_id).await.unwrap();
        if record.run.status == status {
            return record;
        }
        if record.run.status.is_terminal() {
            panic!(
                "run reached terminal status {:?} while waiting for {:?} (error: {:?})",
                record.run.status, status, record.run.error
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for run status {:?}", status);
}

/// Poll until `predicate` holds for the run record, panicking after 5s.
pub async fn wait_until(
    engine: &Engine,
    run_id: &str,
    predicate: impl Fn(&RunRecord) -> bool,
) -> RunRecord {
    for _ in 0..500 {
        let record = engine.get_run(run_id).await.unwrap();
        if predicate(&record) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for run condition");
}
