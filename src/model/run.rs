use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::wait::WaitDescriptor;
use crate::context::RunContext;

/// Run lifecycle status. Mutated only by the scheduler; immutable once
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Branch lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Active,
    Suspended,
    Joined,
    Completed,
    Failed,
}

impl BranchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BranchStatus::Joined | BranchStatus::Completed | BranchStatus::Failed
        )
    }
}

/// One execution instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub input: Value,
    /// Context snapshot of the most recently completed branch.
    #[serde(default)]
    pub context: RunContext,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One concurrently-advancing token within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub run_id: String,
    /// The node this branch is at (or suspended on).
    pub node_id: String,
    pub status: BranchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitDescriptor>,
    #[serde(default)]
    pub context: RunContext,
    /// Monotonic spawn order within the run; activation is FIFO by this.
    pub spawn_seq: u64,
    /// Steps taken so far, checked against the engine's step guard.
    #[serde(default)]
    pub steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted join-accumulation state for one parallel/join pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinState {
    pub parallel_id: String,
    pub join_id: String,
    pub expected: usize,
    /// Arrived branch ids, in arrival order.
    pub arrivals: Vec<String>,
}

impl JoinState {
    pub fn is_complete(&self) -> bool {
        self.arrivals.len() >= self.expected
    }
}

/// The durable unit for a run: the run row plus its branches and any
/// pending join accumulation, persisted together on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: Run,
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub joins: Vec<JoinState>,
}

impl RunRecord {
    pub fn branch(&self, id: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_branch_status_terminal() {
        assert!(BranchStatus::Joined.is_terminal());
        assert!(!BranchStatus::Suspended.is_terminal());
        assert!(!BranchStatus::Active.is_terminal());
    }

    #[test]
    fn test_join_state_complete() {
        let mut join = JoinState {
            parallel_id: "p".into(),
            join_id: "j".into(),
            expected: 2,
            arrivals: vec!["b1".into()],
        };
        assert!(!join.is_complete());
        join.arrivals.push("b2".into());
        assert!(join.is_complete());
    }
}
