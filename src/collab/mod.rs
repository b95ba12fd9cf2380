//! External collaborator interfaces.
//!
//! The engine consumes four services: agent sessions, work tasks, the
//! webhook/event bus, and timers. Each is a narrow async trait; their
//! completions re-enter the engine as [`Wake`] messages through a
//! [`WakeSink`]. The engine never blocks a branch step on collaborator
//! I/O beyond the registration call itself.

mod fakes;
mod timer;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::model::{SessionRequest, TaskRequest, WakeKey};

pub use fakes::{
    FakeSessionService, FakeTaskService, FakeWebhookBus, ManualTimerService, Registration,
};
pub use timer::TokioTimerService;

pub type CollabResult<T> = Result<T, CollabError>;

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("Collaborator rejected request: {0}")]
    Rejected(String),
}

/// Agent Session service: `start_session` returns a session id; the
/// service later emits a completion wake carrying the result or error.
#[async_trait]
pub trait AgentSessionService: Send + Sync {
    async fn start_session(&self, request: &SessionRequest) -> CollabResult<String>;
    /// Best-effort detach; a completion arriving after cancellation is
    /// dropped by the engine.
    async fn cancel_session(&self, session_id: &str) -> CollabResult<()>;
}

/// Work Task service, identical in shape to agent sessions but keyed on a
/// task id.
#[async_trait]
pub trait WorkTaskService: Send + Sync {
    async fn create_task(&self, request: &TaskRequest) -> CollabResult<String>;
    async fn cancel_task(&self, task_id: &str) -> CollabResult<()>;
}

/// Webhook/event bus: registers a waiter for a correlation key and later
/// delivers the payload or a timeout.
#[async_trait]
pub trait WebhookBus: Send + Sync {
    async fn register_waiter(
        &self,
        correlation_key: &str,
        timeout_secs: Option<u64>,
    ) -> CollabResult<String>;
    async fn unregister(&self, waiter_id: &str) -> CollabResult<()>;
}

/// Timer service: schedules an absolute fire time and later emits a
/// [`Wake::TimerFired`].
#[async_trait]
pub trait TimerService: Send + Sync {
    async fn schedule_at(&self, fire_at_ms: i64) -> CollabResult<String>;
    async fn cancel(&self, timer_id: &str) -> CollabResult<()>;
}

/// Bundle of collaborator handles handed to the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn AgentSessionService>,
    pub tasks: Arc<dyn WorkTaskService>,
    pub webhooks: Arc<dyn WebhookBus>,
    pub timers: Arc<dyn TimerService>,
}

/// An asynchronous completion re-entering the engine.
#[derive(Debug, Clone)]
pub enum Wake {
    TimerFired {
        timer_id: String,
    },
    WebhookEvent {
        waiter_id: String,
        payload: Value,
    },
    WebhookTimeout {
        waiter_id: String,
    },
    SessionCompleted {
        session_id: String,
        outcome: Result<Value, String>,
    },
    TaskCompleted {
        task_id: String,
        outcome: Result<Value, String>,
    },
}

impl Wake {
    /// The routing key matching the suspended branch's wait descriptor.
    pub fn key(&self) -> WakeKey {
        match self {
            Wake::TimerFired { timer_id } => WakeKey::Timer(timer_id.clone()),
            Wake::WebhookEvent { waiter_id, .. } | Wake::WebhookTimeout { waiter_id } => {
                WakeKey::Waiter(waiter_id.clone())
            }
            Wake::SessionCompleted { session_id, .. } => WakeKey::Session(session_id.clone()),
            Wake::TaskCompleted { task_id, .. } => WakeKey::Task(task_id.clone()),
        }
    }
}

/// Entry point collaborator implementations use to deliver completions.
#[derive(Clone)]
pub struct WakeSink {
    tx: mpsc::UnboundedSender<Wake>,
}

impl WakeSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Wake>) -> Self {
        Self { tx }
    }

    /// Deliver a completion. Delivery after engine shutdown is a no-op.
    pub fn deliver(&self, wake: Wake) {
        let _ = self.tx.send(wake);
    }
}
