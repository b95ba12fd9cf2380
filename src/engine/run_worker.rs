//! Per-run driver.
//!
//! Each run is owned by exactly one worker task. The worker holds all
//! mutable run state, so branch transitions within a run are serialized
//! without locks while separate runs execute fully in parallel. Wakes and
//! cancellation arrive over the run's message channel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collab::Wake;
use crate::context::RunContext;
use crate::error::{NodeError, WorkflowError, WorkflowResult};
use crate::events::EngineEvent;
use crate::graph::Graph;
use crate::model::{
    Branch, BranchStatus, JoinState, Node, NodeType, RunRecord, RunStatus, WaitDescriptor, WakeKey,
    Workflow,
};
use crate::nodes::control_flow::JoinConfig;
use crate::nodes::{EdgeSelector, HandlerContext, NodeOutcome};

use super::shared::EngineShared;

/// Message delivered to a run worker.
#[derive(Debug)]
pub(crate) enum RunMessage {
    Wake(Wake),
    Cancel,
}

pub(crate) struct RunWorker {
    shared: Arc<EngineShared>,
    workflow: Arc<Workflow>,
    graph: Graph,
    record: RunRecord,
    /// Branch id -> index into `record.branches`.
    branch_index: HashMap<String, usize>,
    /// Wake key -> branch id, for suspended branches with an armed wait.
    waits: HashMap<WakeKey, String>,
    /// Branches waiting for an activation slot, FIFO by spawn order.
    activation_queue: VecDeque<String>,
    /// Branches holding a slot with a step to take.
    ready: VecDeque<String>,
    /// Branches currently holding an activation slot.
    active: HashSet<String>,
    /// Wakes accepted but not yet applied (the branch is queued for a
    /// slot).
    pending_wakes: HashMap<String, Wake>,
    next_spawn_seq: u64,
    rx: mpsc::UnboundedReceiver<RunMessage>,
    cancel: CancellationToken,
}

impl RunWorker {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        workflow: Arc<Workflow>,
        graph: Graph,
        record: RunRecord,
        rx: mpsc::UnboundedReceiver<RunMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let branch_index = record
            .branches
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.clone(), i))
            .collect();
        let next_spawn_seq = record
            .branches
            .iter()
            .map(|b| b.spawn_seq + 1)
            .max()
            .unwrap_or(0);
        RunWorker {
            shared,
            workflow,
            graph,
            record,
            branch_index,
            waits: HashMap::new(),
            activation_queue: VecDeque::new(),
            ready: VecDeque::new(),
            active: HashSet::new(),
            pending_wakes: HashMap::new(),
            next_spawn_seq,
            rx,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) {
        let result = self.drive().await;
        if let Err(error) = result {
            // Engine-level failure (e.g. the store went away). Best-effort
            // mark the run failed so it is not resumed as healthy.
            warn!(run_id = %self.record.run.id, %error, "run worker aborted");
            self.record.run.status = RunStatus::Failed;
            self.record.run.error = Some(error.to_string());
            self.record.run.finished_at = Some(Utc::now());
            let _ = self.persist().await;
        }
        self.release_routes();
        self.shared
            .run_finished(&self.record.run.workflow_id, &self.record.run.id)
            .await;
    }

    async fn drive(&mut self) -> WorkflowResult<()> {
        self.start_or_resume().await?;

        loop {
            while let Ok(message) = self.rx.try_recv() {
                self.handle_message(message).await?;
            }
            if self.cancel.is_cancelled() && !self.record.run.status.is_terminal() {
                self.cancel_run().await?;
            }
            if self.record.run.status.is_terminal() {
                return Ok(());
            }

            self.fill_slots().await?;

            if let Some(branch_id) = self.ready.pop_front() {
                self.step(branch_id).await?;
                continue;
            }

            if self.all_branches_terminal() {
                self.complete_run().await?;
                return Ok(());
            }

            // Nothing active or queued: every live branch is suspended.
            self.set_paused().await?;
            let waited = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                message = self.rx.recv() => message,
            };
            match waited {
                Some(message) => self.handle_message(message).await?,
                None if self.cancel.is_cancelled() => {
                    self.cancel_run().await?;
                    return Ok(());
                }
                // Engine dropped; leave persisted state for recovery.
                None => return Ok(()),
            }
        }
    }

    /// First start of a fresh run, or re-entry of a recovered one.
    async fn start_or_resume(&mut self) -> WorkflowResult<()> {
        if self.record.branches.is_empty() {
            // Fresh run: one branch at the start node, context seeded from
            // the trigger input.
            self.record.run.status = RunStatus::Running;
            self.record.run.started_at = Some(Utc::now());
            let context = RunContext::seeded(self.record.run.input.clone());
            let start_id = self.graph.start_id().to_string();
            let root_id = self.spawn_branch(start_id.clone(), None, context);
            self.persist().await?;
            self.emit(EngineEvent::RunStarted {
                run_id: self.record.run.id.clone(),
                workflow_id: self.record.run.workflow_id.clone(),
                timestamp: Utc::now(),
            });
            self.emit(EngineEvent::BranchSpawned {
                run_id: self.record.run.id.clone(),
                branch_id: root_id,
                node_id: start_id,
                timestamp: Utc::now(),
            });
            return Ok(());
        }

        // Recovered run: re-enter active branches and re-arm suspended
        // waits.
        let mut to_activate: Vec<(u64, String)> = Vec::new();
        let mut to_rearm: Vec<String> = Vec::new();
        for branch in &self.record.branches {
            match branch.status {
                BranchStatus::Active => to_activate.push((branch.spawn_seq, branch.id.clone())),
                BranchStatus::Suspended => to_rearm.push(branch.id.clone()),
                _ => {}
            }
        }
        to_activate.sort();
        for (_, branch_id) in to_activate {
            self.activation_queue.push_back(branch_id);
        }
        for branch_id in to_rearm {
            self.rearm_wait(&branch_id).await?;
        }
        debug!(run_id = %self.record.run.id, "run recovered");
        Ok(())
    }

    async fn handle_message(&mut self, message: RunMessage) -> WorkflowResult<()> {
        match message {
            RunMessage::Cancel => {
                self.cancel.cancel();
                Ok(())
            }
            RunMessage::Wake(wake) => self.handle_wake(wake).await,
        }
    }

    async fn handle_wake(&mut self, wake: Wake) -> WorkflowResult<()> {
        if self.cancel.is_cancelled() || self.record.run.status.is_terminal() {
            debug!(run_id = %self.record.run.id, "dropping wake for terminal run");
            return Ok(());
        }
        let key = wake.key();
        let Some(branch_id) = self.waits.remove(&key) else {
            warn!(run_id = %self.record.run.id, ?key, "dropping stale wake");
            return Ok(());
        };
        self.shared.remove_route(&key);

        let branch = &self.record.branches[self.branch_index[&branch_id]];
        if branch.status != BranchStatus::Suspended {
            warn!(run_id = %self.record.run.id, %branch_id, "wake for non-suspended branch");
            return Ok(());
        }

        self.pending_wakes.insert(branch_id.clone(), wake);
        self.activation_queue.push_back(branch_id);
        self.set_running().await?;
        Ok(())
    }

    /// Activate queued branches FIFO while slots are free. The limit
    /// counts only non-suspended, non-terminal branches.
    async fn fill_slots(&mut self) -> WorkflowResult<()> {
        while self.active.len() < self.workflow.max_concurrency {
            let Some(branch_id) = self.activation_queue.pop_front() else {
                break;
            };
            let index = self.branch_index[&branch_id];
            let branch = &mut self.record.branches[index];
            let resumed = match branch.status {
                BranchStatus::Active => false,
                BranchStatus::Suspended if self.pending_wakes.contains_key(&branch_id) => {
                    branch.status = BranchStatus::Active;
                    branch.wait = None;
                    true
                }
                // Went terminal while queued (run failing or joined).
                _ => continue,
            };
            let node_id = branch.node_id.clone();
            self.active.insert(branch_id.clone());
            self.ready.push_back(branch_id.clone());
            if resumed {
                self.persist().await?;
                self.emit(EngineEvent::BranchResumed {
                    run_id: self.record.run.id.clone(),
                    branch_id,
                    node_id,
                    timestamp: Utc::now(),
                });
            } else {
                self.emit(EngineEvent::BranchActivated {
                    run_id: self.record.run.id.clone(),
                    branch_id,
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Execute one node on behalf of a branch.
    async fn step(&mut self, branch_id: String) -> WorkflowResult<()> {
        let index = self.branch_index[&branch_id];
        let (node_id, steps) = {
            let branch = &mut self.record.branches[index];
            branch.steps += 1;
            (branch.node_id.clone(), branch.steps)
        };
        if steps > self.shared.config.max_steps_per_branch {
            let error = WorkflowError::MaxStepsExceeded {
                branch_id: branch_id.clone(),
                limit: self.shared.config.max_steps_per_branch,
            };
            return self.fail_run(&branch_id, error.to_string()).await;
        }

        let node = match self.graph.node(&node_id) {
            Some(node) => node.clone(),
            None => {
                return self
                    .fail_run(&branch_id, format!("node '{}' missing from graph", node_id))
                    .await
            }
        };

        if node.node_type == NodeType::Join {
            return self.arrive_at_join(branch_id, &node).await;
        }

        self.emit(EngineEvent::NodeStarted {
            run_id: self.record.run.id.clone(),
            branch_id: branch_id.clone(),
            node_id: node_id.clone(),
            timestamp: Utc::now(),
        });

        let Some(handler) = self.shared.registry.get(node.node_type) else {
            return self
                .fail_run(
                    &branch_id,
                    format!("no handler registered for type '{}'", node.node_type),
                )
                .await;
        };

        let pending_wake = self.pending_wakes.remove(&branch_id);
        let outcome = {
            let branch = &mut self.record.branches[index];
            let mut ctx = HandlerContext {
                node: &node,
                run_id: &self.record.run.id,
                branch_id: &branch_id,
                context: &mut branch.context,
                runtime: &self.shared.runtime,
            };
            match &pending_wake {
                Some(wake) => handler.resume(&mut ctx, wake).await,
                None => handler.execute(&mut ctx).await,
            }
        };

        match outcome {
            Ok(NodeOutcome::Advance(selector)) => self.advance(branch_id, &node, selector).await,
            Ok(NodeOutcome::Suspend(wait)) => self.suspend(branch_id, &node, wait).await,
            Ok(NodeOutcome::Complete) => self.complete_branch(branch_id, &node).await,
            Err(error) => self.fail_from_node(branch_id, &node, error).await,
        }
    }

    async fn advance(
        &mut self,
        branch_id: String,
        node: &Node,
        selector: EdgeSelector,
    ) -> WorkflowResult<()> {
        let edges = self.graph.outgoing(&node.id);

        let target = match &selector {
            EdgeSelector::All => {
                let targets: Vec<String> = edges.iter().map(|e| e.target.clone()).collect();
                return self.fork(branch_id, node, targets).await;
            }
            EdgeSelector::Single => {
                let edge = if edges.len() == 1 {
                    edges.first()
                } else {
                    edges.iter().find(|e| e.label.is_none())
                };
                match edge {
                    Some(edge) => edge.target.clone(),
                    None => {
                        let error = NodeError::NoMatchingEdge {
                            node_id: node.id.clone(),
                            label: "<single>".into(),
                        };
                        return self.fail_from_node(branch_id, node, error).await;
                    }
                }
            }
            EdgeSelector::Labeled(label) => {
                let edge = edges
                    .iter()
                    .find(|e| e.label.as_deref() == Some(label.as_str()))
                    .or_else(|| edges.iter().find(|e| e.label.as_deref() == Some("default")));
                match edge {
                    Some(edge) => edge.target.clone(),
                    None => {
                        let error = NodeError::NoMatchingEdge {
                            node_id: node.id.clone(),
                            label: label.clone(),
                        };
                        return self.fail_from_node(branch_id, node, error).await;
                    }
                }
            }
        };

        let index = self.branch_index[&branch_id];
        self.record.branches[index].node_id = target;
        self.persist().await?;
        self.emit(EngineEvent::NodeFinished {
            run_id: self.record.run.id.clone(),
            branch_id: branch_id.clone(),
            node_id: node.id.clone(),
            timestamp: Utc::now(),
        });
        // The branch keeps its slot and steps again.
        self.ready.push_back(branch_id);
        Ok(())
    }

    /// Fork one child branch per parallel edge. The forking branch is
    /// superseded by its children and marked joined.
    async fn fork(
        &mut self,
        branch_id: String,
        node: &Node,
        targets: Vec<String>,
    ) -> WorkflowResult<()> {
        let parent_context = {
            let index = self.branch_index[&branch_id];
            let branch = &mut self.record.branches[index];
            branch.status = BranchStatus::Joined;
            branch.context.clone()
        };
        self.active.remove(&branch_id);

        let join_id = self
            .graph
            .join_for_parallel(&node.id)
            .unwrap_or_default()
            .to_string();
        if !self.record.joins.iter().any(|j| j.parallel_id == node.id) {
            self.record.joins.push(JoinState {
                parallel_id: node.id.clone(),
                join_id,
                expected: targets.len(),
                arrivals: Vec::new(),
            });
        }

        let mut spawned = Vec::new();
        for target in targets {
            let child_id =
                self.spawn_branch(target.clone(), Some(branch_id.clone()), parent_context.clone());
            spawned.push((child_id, target));
        }
        self.persist().await?;
        self.emit(EngineEvent::NodeFinished {
            run_id: self.record.run.id.clone(),
            branch_id: branch_id.clone(),
            node_id: node.id.clone(),
            timestamp: Utc::now(),
        });
        for (child_id, target) in spawned {
            self.emit(EngineEvent::BranchSpawned {
                run_id: self.record.run.id.clone(),
                branch_id: child_id,
                node_id: target,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    fn spawn_branch(
        &mut self,
        node_id: String,
        parent_id: Option<String>,
        context: RunContext,
    ) -> String {
        let branch = Branch {
            id: self.shared.runtime.id_generator.next_id(),
            run_id: self.record.run.id.clone(),
            node_id,
            status: BranchStatus::Active,
            parent_id,
            wait: None,
            context,
            spawn_seq: self.next_spawn_seq,
            steps: 0,
            error: None,
        };
        self.next_spawn_seq += 1;
        let branch_id = branch.id.clone();
        self.branch_index
            .insert(branch_id.clone(), self.record.branches.len());
        self.record.branches.push(branch);
        self.activation_queue.push_back(branch_id.clone());
        branch_id
    }

    /// A branch reached a join node: accumulate it and fire the join once
    /// every sibling has arrived.
    async fn arrive_at_join(&mut self, branch_id: String, node: &Node) -> WorkflowResult<()> {
        let config: JoinConfig = match serde_json::from_value(node.config.clone()) {
            Ok(config) => config,
            Err(e) => {
                return self
                    .fail_from_node(branch_id, node, NodeError::ConfigError(e.to_string()))
                    .await
            }
        };
        let parallel_id = config.joins_parallel_node_id;

        {
            let index = self.branch_index[&branch_id];
            self.record.branches[index].status = BranchStatus::Joined;
        }
        self.active.remove(&branch_id);

        let position = match self
            .record
            .joins
            .iter()
            .position(|j| j.parallel_id == parallel_id)
        {
            Some(position) => position,
            None => {
                self.record.joins.push(JoinState {
                    parallel_id: parallel_id.clone(),
                    join_id: node.id.clone(),
                    expected: self.graph.outgoing(&parallel_id).len(),
                    arrivals: Vec::new(),
                });
                self.record.joins.len() - 1
            }
        };
        let join = &mut self.record.joins[position];
        join.arrivals.push(branch_id.clone());
        let fired = join.is_complete();

        if fired {
            // Merge sibling contexts in spawn order; later siblings
            // overwrite earlier ones.
            let mut arrivals: Vec<usize> = self
                .record
                .joins
                .iter()
                .find(|j| j.parallel_id == parallel_id)
                .map(|j| j.arrivals.iter().map(|id| self.branch_index[id]).collect())
                .unwrap_or_default();
            arrivals.sort_by_key(|&i| self.record.branches[i].spawn_seq);
            let mut merged = RunContext::new();
            for index in arrivals {
                merged.merge_from(&self.record.branches[index].context);
            }

            self.record.joins.retain(|j| j.parallel_id != parallel_id);

            // The continuation proceeds from the join's single outgoing
            // edge.
            let continuation_target = match self.graph.outgoing(&node.id).first() {
                Some(edge) => edge.target.clone(),
                None => {
                    return self
                        .fail_run(&branch_id, format!("join '{}' has no outgoing edge", node.id))
                        .await
                }
            };
            let continuation_id = self.spawn_branch(continuation_target.clone(), None, merged);
            self.persist().await?;
            self.emit(EngineEvent::BranchJoined {
                run_id: self.record.run.id.clone(),
                branch_id,
                join_id: node.id.clone(),
                timestamp: Utc::now(),
            });
            self.emit(EngineEvent::BranchSpawned {
                run_id: self.record.run.id.clone(),
                branch_id: continuation_id,
                node_id: continuation_target,
                timestamp: Utc::now(),
            });
        } else {
            self.persist().await?;
            self.emit(EngineEvent::BranchJoined {
                run_id: self.record.run.id.clone(),
                branch_id,
                join_id: node.id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Park a branch on a wait. The suspension is persisted before the
    /// collaborator registration call, and the external id is patched in
    /// and re-persisted afterwards, so a crash loses at most the one
    /// in-flight registration.
    async fn suspend(
        &mut self,
        branch_id: String,
        node: &Node,
        wait: WaitDescriptor,
    ) -> WorkflowResult<()> {
        {
            let index = self.branch_index[&branch_id];
            let branch = &mut self.record.branches[index];
            branch.status = BranchStatus::Suspended;
            branch.wait = Some(wait);
        }
        self.active.remove(&branch_id);
        self.persist().await?;
        self.emit(EngineEvent::BranchSuspended {
            run_id: self.record.run.id.clone(),
            branch_id: branch_id.clone(),
            node_id: node.id.clone(),
            timestamp: Utc::now(),
        });

        if let Err(error) = self.arm_wait(&branch_id, false).await {
            return self.fail_from_node(branch_id, node, error).await;
        }
        self.persist().await?;
        Ok(())
    }

    /// Perform the collaborator registration for a suspended branch and
    /// index the resulting wake key. When `recovering`, session/task waits
    /// that already carry an external id are re-indexed, not re-requested.
    async fn arm_wait(&mut self, branch_id: &str, recovering: bool) -> Result<(), NodeError> {
        let index = self.branch_index[branch_id];
        let wait = match &self.record.branches[index].wait {
            Some(wait) => wait.clone(),
            None => return Ok(()),
        };
        let collab = &self.shared.collab;

        let armed = match wait {
            WaitDescriptor::Timer { fire_at_ms, .. } => {
                // Timers do not survive a restart; always (re-)schedule.
                let timer_id = collab
                    .timers
                    .schedule_at(fire_at_ms)
                    .await
                    .map_err(|e| NodeError::Collaborator(e.to_string()))?;
                WaitDescriptor::Timer {
                    fire_at_ms,
                    timer_id: Some(timer_id),
                }
            }
            WaitDescriptor::Webhook {
                correlation_key,
                timeout_secs,
                timeout_edge,
                ..
            } => {
                let waiter_id = collab
                    .webhooks
                    .register_waiter(&correlation_key, timeout_secs)
                    .await
                    .map_err(|e| NodeError::Collaborator(e.to_string()))?;
                WaitDescriptor::Webhook {
                    correlation_key,
                    timeout_secs,
                    timeout_edge,
                    waiter_id: Some(waiter_id),
                }
            }
            WaitDescriptor::Session {
                request,
                session_id,
            } => {
                let session_id = match session_id {
                    // Already started before the crash; completions route
                    // by the durable id.
                    Some(id) if recovering => id,
                    _ => collab
                        .sessions
                        .start_session(&request)
                        .await
                        .map_err(|e| NodeError::Collaborator(e.to_string()))?,
                };
                WaitDescriptor::Session {
                    request,
                    session_id: Some(session_id),
                }
            }
            WaitDescriptor::Task { request, task_id } => {
                let task_id = match task_id {
                    Some(id) if recovering => id,
                    _ => collab
                        .tasks
                        .create_task(&request)
                        .await
                        .map_err(|e| NodeError::Collaborator(e.to_string()))?,
                };
                WaitDescriptor::Task {
                    request,
                    task_id: Some(task_id),
                }
            }
        };

        let key = armed.wake_key().ok_or_else(|| {
            NodeError::Collaborator("registration returned no identifier".into())
        })?;
        self.record.branches[index].wait = Some(armed);
        self.waits.insert(key.clone(), branch_id.to_string());
        self.shared.register_route(key, &self.record.run.id);
        Ok(())
    }

    /// Re-arm a suspended branch after recovery.
    async fn rearm_wait(&mut self, branch_id: &str) -> WorkflowResult<()> {
        if let Err(error) = self.arm_wait(branch_id, true).await {
            let index = self.branch_index[branch_id];
            let node_id = self.record.branches[index].node_id.clone();
            return self
                .fail_run(branch_id, format!("re-arming node '{}': {}", node_id, error))
                .await;
        }
        self.persist().await
    }

    async fn complete_branch(&mut self, branch_id: String, node: &Node) -> WorkflowResult<()> {
        {
            let index = self.branch_index[&branch_id];
            let branch = &mut self.record.branches[index];
            branch.status = BranchStatus::Completed;
            self.record.run.context = branch.context.clone();
        }
        self.active.remove(&branch_id);
        self.persist().await?;
        self.emit(EngineEvent::NodeFinished {
            run_id: self.record.run.id.clone(),
            branch_id: branch_id.clone(),
            node_id: node.id.clone(),
            timestamp: Utc::now(),
        });
        self.emit(EngineEvent::BranchCompleted {
            run_id: self.record.run.id.clone(),
            branch_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn fail_from_node(
        &mut self,
        branch_id: String,
        node: &Node,
        error: NodeError,
    ) -> WorkflowResult<()> {
        let message = WorkflowError::from_node_error(&node.id, &error).to_string();
        self.fail_run(&branch_id, message).await
    }

    /// Unrecoverable: mark the failing branch, abort its siblings, and
    /// fail the run.
    async fn fail_run(&mut self, branch_id: &str, error: String) -> WorkflowResult<()> {
        self.detach_waits().await;
        for branch in &mut self.record.branches {
            if branch.status.is_terminal() {
                continue;
            }
            branch.wait = None;
            branch.status = BranchStatus::Failed;
            branch.error = Some(if branch.id == branch_id {
                error.clone()
            } else {
                "aborted by failed sibling branch".into()
            });
        }
        self.active.clear();
        self.ready.clear();
        self.activation_queue.clear();
        self.pending_wakes.clear();

        self.record.run.status = RunStatus::Failed;
        self.record.run.error = Some(error.clone());
        self.record.run.finished_at = Some(Utc::now());
        self.persist().await?;
        self.emit(EngineEvent::BranchFailed {
            run_id: self.record.run.id.clone(),
            branch_id: branch_id.to_string(),
            error: error.clone(),
            timestamp: Utc::now(),
        });
        self.emit(EngineEvent::RunFailed {
            run_id: self.record.run.id.clone(),
            error,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn cancel_run(&mut self) -> WorkflowResult<()> {
        self.detach_waits().await;
        for branch in &mut self.record.branches {
            if branch.status.is_terminal() {
                continue;
            }
            branch.wait = None;
            branch.status = BranchStatus::Failed;
            branch.error = Some("run cancelled".into());
        }
        self.active.clear();
        self.ready.clear();
        self.activation_queue.clear();
        self.pending_wakes.clear();

        self.record.run.status = RunStatus::Cancelled;
        self.record.run.finished_at = Some(Utc::now());
        self.persist().await?;
        self.emit(EngineEvent::RunCancelled {
            run_id: self.record.run.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Best-effort detach of every armed wait from its collaborator.
    async fn detach_waits(&mut self) {
        let keys: Vec<WakeKey> = self.waits.keys().cloned().collect();
        for key in keys {
            self.shared.remove_route(&key);
        }
        self.waits.clear();

        let collab = self.shared.collab.clone();
        for branch in &self.record.branches {
            let Some(wait) = &branch.wait else { continue };
            let result = match wait {
                WaitDescriptor::Timer {
                    timer_id: Some(id), ..
                } => collab.timers.cancel(id).await,
                WaitDescriptor::Webhook {
                    waiter_id: Some(id),
                    ..
                } => collab.webhooks.unregister(id).await,
                WaitDescriptor::Session {
                    session_id: Some(id),
                    ..
                } => collab.sessions.cancel_session(id).await,
                WaitDescriptor::Task {
                    task_id: Some(id), ..
                } => collab.tasks.cancel_task(id).await,
                _ => Ok(()),
            };
            if let Err(error) = result {
                debug!(run_id = %self.record.run.id, %error, "wait detach failed");
            }
        }
    }

    async fn complete_run(&mut self) -> WorkflowResult<()> {
        self.record.run.status = RunStatus::Completed;
        self.record.run.finished_at = Some(Utc::now());
        self.persist().await?;
        self.emit(EngineEvent::RunCompleted {
            run_id: self.record.run.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn set_paused(&mut self) -> WorkflowResult<()> {
        if self.record.run.status != RunStatus::Running {
            return Ok(());
        }
        self.record.run.status = RunStatus::Paused;
        self.persist().await?;
        self.emit(EngineEvent::RunPaused {
            run_id: self.record.run.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn set_running(&mut self) -> WorkflowResult<()> {
        if self.record.run.status != RunStatus::Paused {
            return Ok(());
        }
        self.record.run.status = RunStatus::Running;
        self.persist().await?;
        self.emit(EngineEvent::RunResumed {
            run_id: self.record.run.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn all_branches_terminal(&self) -> bool {
        self.record.branches.iter().all(|b| b.status.is_terminal())
    }

    /// Persist the run record synchronously, before any external side
    /// effect that depends on the transition.
    async fn persist(&self) -> WorkflowResult<()> {
        self.shared.store.save_run(&self.record).await?;
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        self.shared.events.emit(event);
    }

    fn release_routes(&self) {
        for key in self.waits.keys() {
            self.shared.remove_route(key);
        }
    }
}
