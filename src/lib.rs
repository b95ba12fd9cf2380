//! # agentflow — a graph-based workflow orchestration engine
//!
//! `agentflow` executes *runs* of typed node graphs: a trigger creates a
//! run, branches advance token-style through nodes, suspend durably on
//! timers, webhook events, and collaborator completions, fork and join
//! under a per-run concurrency limit, and terminate in a definite outcome.
//! Runs survive process restarts: every branch transition is persisted
//! before external side effects, and [`Engine::recover`] re-arms all
//! outstanding waits on startup.
//!
//! Node types: `start`, `end`, `agent_session`, `work_task`, `condition`,
//! `delay`, `webhook_wait`, `transform`, `parallel`, `join`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agentflow::{Engine, WorkflowSpec, Node, Edge, NodeType};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::builder().build();
//!     let workflow = engine
//!         .create_workflow(WorkflowSpec {
//!             name: "hello".into(),
//!             nodes: vec![
//!                 Node::new("start", NodeType::Start),
//!                 Node::new("end", NodeType::End),
//!             ],
//!             edges: vec![Edge::new("e1", "start", "end")],
//!             ..Default::default()
//!         })
//!         .await
//!         .unwrap();
//!     engine.activate_workflow(&workflow.id).await.unwrap();
//!     let run = engine.trigger(&workflow.id, json!({})).await.unwrap();
//!     let record = engine.wait_for_run(&run.id).await.unwrap();
//!     println!("{:?}", record.run.status);
//! }
//! ```

pub mod collab;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod graph;
pub mod model;
pub mod nodes;
pub mod runtime;
pub mod store;

pub use crate::collab::{
    AgentSessionService, CollabError, Collaborators, FakeSessionService, FakeTaskService,
    FakeWebhookBus, ManualTimerService, TimerService, TokioTimerService, Wake, WakeSink,
    WebhookBus, WorkTaskService,
};
pub use crate::config::{ConcurrencyScope, EngineConfig};
pub use crate::context::RunContext;
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{NodeError, ValidationError, WorkflowError, WorkflowResult};
pub use crate::events::{EngineEvent, EventHub};
pub use crate::graph::{validate_workflow, Graph};
pub use crate::model::{
    Branch, BranchStatus, Edge, JoinState, Node, NodeType, Run, RunRecord, RunStatus,
    SessionRequest, TaskRequest, WaitDescriptor, WakeKey, Workflow, WorkflowSpec, WorkflowStatus,
};
pub use crate::nodes::{EdgeSelector, HandlerContext, HandlerRegistry, NodeHandler, NodeOutcome};
pub use crate::runtime::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, RealIdGenerator, RealTimeProvider,
    RuntimeContext, TimeProvider,
};
pub use crate::store::{FileStore, MemoryStore, RunStore, Store, StoreError, WorkflowStore};
