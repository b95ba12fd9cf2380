//! Core data model: workflow definitions, runs, branches, and wait state.

mod run;
mod wait;
mod workflow;

pub use run::{Branch, BranchStatus, JoinState, Run, RunRecord, RunStatus};
pub use wait::{SessionRequest, TaskRequest, WaitDescriptor, WakeKey};
pub use workflow::{Edge, Node, NodeType, Workflow, WorkflowSpec, WorkflowStatus};
