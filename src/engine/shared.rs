//! State shared between the engine facade, the wake router, and run
//! workers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collab::{Collaborators, Wake};
use crate::config::{ConcurrencyScope, EngineConfig};
use crate::error::WorkflowResult;
use crate::events::EventHub;
use crate::graph::Graph;
use crate::model::{RunRecord, RunStatus, WakeKey, Workflow};
use crate::nodes::HandlerRegistry;
use crate::runtime::RuntimeContext;
use crate::store::Store;

use super::run_worker::{RunMessage, RunWorker};

/// Completions that arrived before their route was registered. External
/// services may deliver a result in the middle of the registration call
/// itself; these are parked and flushed when the route appears.
const UNROUTED_CAP: usize = 1024;

pub(crate) struct RunHandle {
    pub tx: mpsc::UnboundedSender<RunMessage>,
    pub cancel: CancellationToken,
}

pub(crate) struct EngineShared {
    pub store: Arc<dyn Store>,
    pub registry: Arc<HandlerRegistry>,
    pub collab: Collaborators,
    pub runtime: RuntimeContext,
    pub config: EngineConfig,
    pub events: EventHub,
    pub runs: DashMap<String, RunHandle>,
    routes: DashMap<WakeKey, String>,
    unrouted: Mutex<VecDeque<Wake>>,
    /// Per-workflow FIFO of pending run ids (PerWorkflow scope only).
    pending_runs: Mutex<HashMap<String, VecDeque<String>>>,
    running_counts: Mutex<HashMap<String, usize>>,
}

impl EngineShared {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        registry: Arc<HandlerRegistry>,
        collab: Collaborators,
        runtime: RuntimeContext,
        config: EngineConfig,
        events: EventHub,
    ) -> Self {
        EngineShared {
            store,
            registry,
            collab,
            runtime,
            config,
            events,
            runs: DashMap::new(),
            routes: DashMap::new(),
            unrouted: Mutex::new(VecDeque::new()),
            pending_runs: Mutex::new(HashMap::new()),
            running_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Route a completion to the owning run, or park it until the route
    /// registration catches up. Completions for unknown (finished or
    /// cancelled) waits are eventually dropped.
    pub(crate) fn route_wake(&self, wake: Wake) {
        let key = wake.key();
        if let Some(run_id) = self.routes.get(&key).map(|r| r.value().clone()) {
            self.forward(&run_id, wake);
            return;
        }
        let mut unrouted = self.unrouted.lock();
        if unrouted.len() >= UNROUTED_CAP {
            let dropped = unrouted.pop_front();
            warn!(?dropped, "unrouted wake buffer full, dropping oldest");
        }
        unrouted.push_back(wake);
    }

    /// Register a wake route and flush any completion that raced ahead of
    /// it.
    pub(crate) fn register_route(&self, key: WakeKey, run_id: &str) {
        self.routes.insert(key.clone(), run_id.to_string());
        let buffered: Vec<Wake> = {
            let mut unrouted = self.unrouted.lock();
            let mut buffered = Vec::new();
            unrouted.retain(|wake| {
                if wake.key() == key {
                    buffered.push(wake.clone());
                    false
                } else {
                    true
                }
            });
            buffered
        };
        for wake in buffered {
            self.forward(run_id, wake);
        }
    }

    pub(crate) fn remove_route(&self, key: &WakeKey) {
        self.routes.remove(key);
    }

    fn forward(&self, run_id: &str, wake: Wake) {
        match self.runs.get(run_id) {
            Some(handle) => {
                let _ = handle.tx.send(RunMessage::Wake(wake));
            }
            None => debug!(%run_id, "dropping wake for finished run"),
        }
    }

    /// Launch the worker task for a non-terminal run record.
    pub(crate) async fn launch_run(
        self: &Arc<Self>,
        workflow: Arc<Workflow>,
        record: RunRecord,
    ) -> WorkflowResult<()> {
        let graph = match Graph::build(&workflow) {
            Ok(graph) => graph,
            Err(error) => {
                // The definition degraded after activation; the run can
                // never make progress.
                let mut record = record;
                record.run.status = RunStatus::Failed;
                record.run.error = Some(error.to_string());
                record.run.finished_at = Some(Utc::now());
                self.store.save_run(&record).await?;
                return Err(error.into());
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let run_id = record.run.id.clone();
        let workflow_id = record.run.workflow_id.clone();
        self.runs.insert(
            run_id.clone(),
            RunHandle {
                tx,
                cancel: cancel.clone(),
            },
        );
        *self
            .running_counts
            .lock()
            .entry(workflow_id)
            .or_default() += 1;

        let worker = RunWorker::new(Arc::clone(self), workflow, graph, record, rx, cancel);
        tokio::spawn(worker.run());
        debug!(%run_id, "run worker launched");
        Ok(())
    }

    /// Worker teardown: free the handle and, under per-workflow scope,
    /// start the next pending run FIFO.
    pub(crate) async fn run_finished(self: &Arc<Self>, workflow_id: &str, run_id: &str) {
        self.runs.remove(run_id);
        self.routes.retain(|_, owner| owner.as_str() != run_id);
        {
            let mut counts = self.running_counts.lock();
            if let Some(count) = counts.get_mut(workflow_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(workflow_id);
                }
            }
        }

        if self.config.concurrency_scope != ConcurrencyScope::PerWorkflow {
            return;
        }
        let next = self
            .pending_runs
            .lock()
            .get_mut(workflow_id)
            .and_then(VecDeque::pop_front);
        if let Some(next_run_id) = next {
            if let Err(error) = self.launch_pending(&next_run_id).await {
                warn!(%next_run_id, %error, "failed to start pending run");
            }
        }
    }

    pub(crate) fn running_count(&self, workflow_id: &str) -> usize {
        self.running_counts
            .lock()
            .get(workflow_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn enqueue_pending(&self, workflow_id: &str, run_id: &str) {
        self.pending_runs
            .lock()
            .entry(workflow_id.to_string())
            .or_default()
            .push_back(run_id.to_string());
    }

    /// Drop a pending run from its queue; returns whether it was queued.
    pub(crate) fn remove_pending(&self, workflow_id: &str, run_id: &str) -> bool {
        let mut pending = self.pending_runs.lock();
        match pending.get_mut(workflow_id) {
            Some(queue) => {
                let before = queue.len();
                queue.retain(|id| id != run_id);
                before != queue.len()
            }
            None => false,
        }
    }

    // Returns a boxed `dyn Future + Send` rather than an `async fn` so that
    // the mutually-recursive `run` -> `run_finished` -> `launch_pending` ->
    // `launch_run` -> spawn cycle has a concrete `Send` type to terminate
    // rustc's auto-trait inference on; an `async fn` here leaves every link
    // opaque and the cycle resolves conservatively as non-`Send`.
    fn launch_pending<'a>(
        self: &'a Arc<Self>,
        run_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = WorkflowResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(record) = self.store.load_run(run_id).await? else {
                return Ok(());
            };
            if record.run.status.is_terminal() {
                return Ok(());
            }
            let Some(workflow) = self.store.load_workflow(&record.run.workflow_id).await? else {
                return Ok(());
            };
            self.launch_run(Arc::new(workflow), record).await
        })
    }
}
