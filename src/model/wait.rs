use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resolved request for starting an agent session, captured at suspension
/// time so recovery can re-issue the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub agent_id: String,
    pub prompt: String,
    #[serde(default)]
    pub config: Value,
}

/// Resolved request for creating a work task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub agent_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Durable description of what a suspended branch is waiting for.
///
/// The external id fields (`timer_id`, `waiter_id`, ...) are `None` when
/// the branch is first persisted and are patched in after the collaborator
/// registration call succeeds. Recovery re-arms from the durable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitDescriptor {
    Timer {
        /// Absolute wake time, unix epoch milliseconds.
        fire_at_ms: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timer_id: Option<String>,
    },
    Webhook {
        correlation_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_edge: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waiter_id: Option<String>,
    },
    Session {
        request: SessionRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Task {
        request: TaskRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
}

impl WaitDescriptor {
    /// The routing key a wake for this wait will carry, once the external
    /// id has been assigned.
    pub fn wake_key(&self) -> Option<WakeKey> {
        match self {
            WaitDescriptor::Timer { timer_id, .. } => {
                timer_id.clone().map(WakeKey::Timer)
            }
            WaitDescriptor::Webhook { waiter_id, .. } => {
                waiter_id.clone().map(WakeKey::Waiter)
            }
            WaitDescriptor::Session { session_id, .. } => {
                session_id.clone().map(WakeKey::Session)
            }
            WaitDescriptor::Task { task_id, .. } => task_id.clone().map(WakeKey::Task),
        }
    }
}

/// Correlates an incoming external completion with the branch awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WakeKey {
    Timer(String),
    Waiter(String),
    Session(String),
    Task(String),
}
