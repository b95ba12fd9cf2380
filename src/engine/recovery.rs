//! Startup recovery.
//!
//! Reloads every non-terminal run from the store, re-arms suspended
//! branches' waits (timers and webhook registrations are re-issued;
//! session and task completions re-route by their durable ids), and
//! re-enters active branches into the step loop.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::ConcurrencyScope;
use crate::error::WorkflowResult;
use crate::model::RunStatus;

use super::Engine;

impl Engine {
    /// Resume all non-terminal runs. Returns the number of run workers
    /// launched. Runs whose workflow definition no longer loads or no
    /// longer validates are marked failed rather than retried forever.
    pub async fn recover(&self) -> WorkflowResult<usize> {
        let shared = self.shared();
        let open = shared.store.load_open_runs().await?;
        let mut resumed = 0;

        for mut record in open {
            let run_id = record.run.id.clone();
            if shared.runs.contains_key(&run_id) {
                continue;
            }

            let workflow = match shared.store.load_workflow(&record.run.workflow_id).await? {
                Some(workflow) => workflow,
                None => {
                    warn!(%run_id, workflow_id = %record.run.workflow_id, "workflow definition missing, failing run");
                    record.run.status = RunStatus::Failed;
                    record.run.error = Some("workflow definition missing".into());
                    record.run.finished_at = Some(Utc::now());
                    shared.store.save_run(&record).await?;
                    continue;
                }
            };

            // A run that never left pending re-enters the trigger queue
            // under per-workflow scope instead of bypassing the limit.
            if record.run.status == RunStatus::Pending
                && shared.config.concurrency_scope == ConcurrencyScope::PerWorkflow
                && shared.running_count(&workflow.id) >= workflow.max_concurrency
            {
                shared.enqueue_pending(&workflow.id, &run_id);
                continue;
            }

            match shared.launch_run(Arc::new(workflow), record).await {
                Ok(()) => resumed += 1,
                Err(error) => {
                    warn!(%run_id, %error, "failed to resume run");
                }
            }
        }

        info!(resumed, "recovery complete");
        Ok(resumed)
    }
}
