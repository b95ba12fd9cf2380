//! Engine facade: workflow lifecycle, triggering, cancellation, wake
//! delivery, and recovery.

mod recovery;
mod run_worker;
mod shared;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::collab::{
    AgentSessionService, Collaborators, FakeSessionService, FakeTaskService, FakeWebhookBus,
    TimerService, TokioTimerService, Wake, WakeSink, WebhookBus, WorkTaskService,
};
use crate::config::{ConcurrencyScope, EngineConfig};
use crate::context::RunContext;
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{EngineEvent, EventHub};
use crate::graph::validate_workflow;
use crate::model::{Run, RunRecord, RunStatus, Workflow, WorkflowSpec, WorkflowStatus};
use crate::nodes::HandlerRegistry;
use crate::runtime::RuntimeContext;
use crate::store::{MemoryStore, Store};

use run_worker::RunMessage;
use shared::EngineShared;

/// The workflow orchestration engine.
///
/// Cheap to clone; all state lives behind an `Arc`. Construct with
/// [`Engine::builder`] inside a tokio runtime.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
    sink: WakeSink,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    // --- Workflow lifecycle ---

    /// Create a workflow in `Draft` status. The definition is validated
    /// immediately; a structurally invalid graph is rejected here and
    /// again at activation.
    pub async fn create_workflow(&self, spec: WorkflowSpec) -> WorkflowResult<Workflow> {
        let now = Utc::now();
        let workflow = Workflow {
            id: self.shared.runtime.id_generator.next_id(),
            name: spec.name,
            description: spec.description,
            agent_id: spec.agent_id,
            status: WorkflowStatus::Draft,
            nodes: spec.nodes,
            edges: spec.edges,
            max_concurrency: spec.max_concurrency,
            created_at: now,
            updated_at: now,
        };
        validate_workflow(&workflow)?;
        self.shared.store.save_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Replace a workflow's definition. Runs already in flight keep the
    /// definition they started with.
    pub async fn update_workflow(
        &self,
        workflow_id: &str,
        spec: WorkflowSpec,
    ) -> WorkflowResult<Workflow> {
        let mut workflow = self.load_workflow(workflow_id).await?;
        workflow.name = spec.name;
        workflow.description = spec.description;
        workflow.agent_id = spec.agent_id;
        workflow.nodes = spec.nodes;
        workflow.edges = spec.edges;
        workflow.max_concurrency = spec.max_concurrency;
        workflow.updated_at = Utc::now();
        validate_workflow(&workflow)?;
        self.shared.store.save_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Validate and move a workflow to `Active`, making it triggerable.
    pub async fn activate_workflow(&self, workflow_id: &str) -> WorkflowResult<Workflow> {
        let mut workflow = self.load_workflow(workflow_id).await?;
        validate_workflow(&workflow)?;
        workflow.status = WorkflowStatus::Active;
        workflow.updated_at = Utc::now();
        self.shared.store.save_workflow(&workflow).await?;
        Ok(workflow)
    }

    /// Move a workflow to `Paused`; existing runs continue, new triggers
    /// are rejected.
    pub async fn pause_workflow(&self, workflow_id: &str) -> WorkflowResult<Workflow> {
        let mut workflow = self.load_workflow(workflow_id).await?;
        workflow.status = WorkflowStatus::Paused;
        workflow.updated_at = Utc::now();
        self.shared.store.save_workflow(&workflow).await?;
        Ok(workflow)
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> WorkflowResult<Workflow> {
        self.load_workflow(workflow_id).await
    }

    pub async fn list_workflows(&self) -> WorkflowResult<Vec<Workflow>> {
        Ok(self.shared.store.list_workflows().await?)
    }

    // --- Runs ---

    /// Create and start a run of an active workflow.
    pub async fn trigger(&self, workflow_id: &str, input: Value) -> WorkflowResult<Run> {
        let workflow = self.load_workflow(workflow_id).await?;
        if workflow.status != WorkflowStatus::Active {
            return Err(WorkflowError::WorkflowNotActive {
                id: workflow.id,
                status: workflow.status.as_str().into(),
            });
        }

        let run = Run {
            id: self.shared.runtime.id_generator.next_id(),
            workflow_id: workflow.id.clone(),
            status: RunStatus::Pending,
            input,
            context: RunContext::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        };
        let record = RunRecord {
            run: run.clone(),
            branches: Vec::new(),
            joins: Vec::new(),
        };
        self.shared.store.save_run(&record).await?;

        if self.shared.config.concurrency_scope == ConcurrencyScope::PerWorkflow
            && self.shared.running_count(&workflow.id) >= workflow.max_concurrency
        {
            self.shared.enqueue_pending(&workflow.id, &run.id);
            return Ok(run);
        }

        self.shared.launch_run(Arc::new(workflow), record).await?;
        Ok(run)
    }

    /// Cancel a run. Cooperative and idempotent at the wait boundaries:
    /// in-flight collaborator operations are detached best-effort, and any
    /// late completion for the run is dropped.
    pub async fn cancel(&self, run_id: &str) -> WorkflowResult<()> {
        let Some(mut record) = self.shared.store.load_run(run_id).await? else {
            return Err(WorkflowError::RunNotFound(run_id.to_string()));
        };
        if record.run.status.is_terminal() {
            return Err(WorkflowError::RunAlreadyTerminal(run_id.to_string()));
        }

        if let Some(handle) = self.shared.runs.get(run_id) {
            handle.cancel.cancel();
            let _ = handle.tx.send(RunMessage::Cancel);
            return Ok(());
        }

        // Not live: a pending queued run or one awaiting recovery.
        self.shared
            .remove_pending(&record.run.workflow_id, run_id);
        record.run.status = RunStatus::Cancelled;
        record.run.finished_at = Some(Utc::now());
        self.shared.store.save_run(&record).await?;
        self.shared.events.emit(EngineEvent::RunCancelled {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// The run row plus full branch detail, for inspection.
    pub async fn get_run(&self, run_id: &str) -> WorkflowResult<RunRecord> {
        self.shared
            .store
            .load_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.to_string()))
    }

    pub async fn list_runs(&self, workflow_id: &str) -> WorkflowResult<Vec<RunRecord>> {
        Ok(self.shared.store.list_runs(workflow_id).await?)
    }

    /// Block until the run reaches a terminal status, polling the store.
    pub async fn wait_for_run(&self, run_id: &str) -> WorkflowResult<RunRecord> {
        loop {
            let record = self.get_run(run_id).await?;
            if record.run.status.is_terminal() {
                return Ok(record);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    // --- Notifications ---

    /// Subscribe to engine events. The scheduler emits one after every
    /// persisted transition; transports fan out downstream.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    // --- Completion delivery ---

    /// Sink collaborator implementations deliver completions through.
    pub fn wake_sink(&self) -> WakeSink {
        self.sink.clone()
    }

    pub fn deliver_session_result(&self, session_id: &str, outcome: Result<Value, String>) {
        self.sink.deliver(Wake::SessionCompleted {
            session_id: session_id.to_string(),
            outcome,
        });
    }

    pub fn deliver_task_result(&self, task_id: &str, outcome: Result<Value, String>) {
        self.sink.deliver(Wake::TaskCompleted {
            task_id: task_id.to_string(),
            outcome,
        });
    }

    pub fn deliver_webhook_event(&self, waiter_id: &str, payload: Value) {
        self.sink.deliver(Wake::WebhookEvent {
            waiter_id: waiter_id.to_string(),
            payload,
        });
    }

    pub fn deliver_webhook_timeout(&self, waiter_id: &str) {
        self.sink.deliver(Wake::WebhookTimeout {
            waiter_id: waiter_id.to_string(),
        });
    }

    pub fn fire_timer(&self, timer_id: &str) {
        self.sink.deliver(Wake::TimerFired {
            timer_id: timer_id.to_string(),
        });
    }

    async fn load_workflow(&self, workflow_id: &str) -> WorkflowResult<Workflow> {
        self.shared
            .store
            .load_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))
    }

    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }
}

/// Builder for [`Engine`].
///
/// The wake channel is created up front so collaborator implementations
/// can be constructed around [`wake_sink`](Self::wake_sink) before the
/// engine exists.
pub struct EngineBuilder {
    wake_tx: mpsc::UnboundedSender<Wake>,
    wake_rx: mpsc::UnboundedReceiver<Wake>,
    store: Option<Arc<dyn Store>>,
    registry: Option<Arc<HandlerRegistry>>,
    runtime: RuntimeContext,
    config: EngineConfig,
    sessions: Option<Arc<dyn AgentSessionService>>,
    tasks: Option<Arc<dyn WorkTaskService>>,
    webhooks: Option<Arc<dyn WebhookBus>>,
    timers: Option<Arc<dyn TimerService>>,
}

impl EngineBuilder {
    fn new() -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        EngineBuilder {
            wake_tx,
            wake_rx,
            store: None,
            registry: None,
            runtime: RuntimeContext::default(),
            config: EngineConfig::default(),
            sessions: None,
            tasks: None,
            webhooks: None,
            timers: None,
        }
    }

    pub fn wake_sink(&self) -> WakeSink {
        WakeSink::new(self.wake_tx.clone())
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn runtime(mut self, runtime: RuntimeContext) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn AgentSessionService>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn tasks(mut self, tasks: Arc<dyn WorkTaskService>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn webhooks(mut self, webhooks: Arc<dyn WebhookBus>) -> Self {
        self.webhooks = Some(webhooks);
        self
    }

    pub fn timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Build the engine and spawn its wake-routing task. Must be called
    /// within a tokio runtime.
    pub fn build(self) -> Engine {
        let sink = WakeSink::new(self.wake_tx.clone());
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let registry = self.registry.unwrap_or_default();
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(FakeSessionService::new(sink.clone())));
        let tasks = self
            .tasks
            .unwrap_or_else(|| Arc::new(FakeTaskService::new(sink.clone())));
        let webhooks = self
            .webhooks
            .unwrap_or_else(|| Arc::new(FakeWebhookBus::new(sink.clone())));
        let timers = self.timers.unwrap_or_else(|| {
            Arc::new(TokioTimerService::new(
                sink.clone(),
                self.runtime.id_generator.clone(),
            ))
        });

        let shared = Arc::new(EngineShared::new(
            store,
            registry,
            Collaborators {
                sessions,
                tasks,
                webhooks,
                timers,
            },
            self.runtime,
            self.config,
            EventHub::new(),
        ));

        let router = Arc::clone(&shared);
        let mut wake_rx = self.wake_rx;
        tokio::spawn(async move {
            while let Some(wake) = wake_rx.recv().await {
                router.route_wake(wake);
            }
        });

        Engine { shared, sink }
    }
}
