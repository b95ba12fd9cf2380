//! Controllable collaborator implementations for tests and embedding.
//!
//! Each fake records the calls it receives and delivers completions
//! through the engine's [`WakeSink`], either scripted up front or pushed
//! manually from a test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::model::{SessionRequest, TaskRequest};

use super::{
    AgentSessionService, CollabResult, TimerService, Wake, WakeSink, WebhookBus, WorkTaskService,
};

/// Agent session service that assigns sequential session ids. If results
/// are scripted, each `start_session` auto-delivers the next one;
/// otherwise completions are pushed via [`complete`](Self::complete).
pub struct FakeSessionService {
    sink: WakeSink,
    counter: AtomicU64,
    started: Mutex<Vec<(String, SessionRequest)>>,
    cancelled: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<Result<Value, String>>>,
}

impl FakeSessionService {
    pub fn new(sink: WakeSink) -> Self {
        Self {
            sink,
            counter: AtomicU64::new(0),
            started: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a result delivered automatically on the next `start_session`.
    pub fn script_result(&self, outcome: Result<Value, String>) {
        self.scripted.lock().push_back(outcome);
    }

    /// Manually complete a session.
    pub fn complete(&self, session_id: &str, outcome: Result<Value, String>) {
        self.sink.deliver(Wake::SessionCompleted {
            session_id: session_id.to_string(),
            outcome,
        });
    }

    pub fn started(&self) -> Vec<(String, SessionRequest)> {
        self.started.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

#[async_trait]
impl AgentSessionService for FakeSessionService {
    async fn start_session(&self, request: &SessionRequest) -> CollabResult<String> {
        let session_id = format!("sess-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.started
            .lock()
            .push((session_id.clone(), request.clone()));
        if let Some(outcome) = self.scripted.lock().pop_front() {
            self.sink.deliver(Wake::SessionCompleted {
                session_id: session_id.clone(),
                outcome,
            });
        }
        Ok(session_id)
    }

    async fn cancel_session(&self, session_id: &str) -> CollabResult<()> {
        self.cancelled.lock().push(session_id.to_string());
        Ok(())
    }
}

/// Work task service mirror of [`FakeSessionService`].
pub struct FakeTaskService {
    sink: WakeSink,
    counter: AtomicU64,
    created: Mutex<Vec<(String, TaskRequest)>>,
    cancelled: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<Result<Value, String>>>,
}

impl FakeTaskService {
    pub fn new(sink: WakeSink) -> Self {
        Self {
            sink,
            counter: AtomicU64::new(0),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn script_result(&self, outcome: Result<Value, String>) {
        self.scripted.lock().push_back(outcome);
    }

    pub fn complete(&self, task_id: &str, outcome: Result<Value, String>) {
        self.sink.deliver(Wake::TaskCompleted {
            task_id: task_id.to_string(),
            outcome,
        });
    }

    pub fn created(&self) -> Vec<(String, TaskRequest)> {
        self.created.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

#[async_trait]
impl WorkTaskService for FakeTaskService {
    async fn create_task(&self, request: &TaskRequest) -> CollabResult<String> {
        let task_id = format!("task-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.created.lock().push((task_id.clone(), request.clone()));
        if let Some(outcome) = self.scripted.lock().pop_front() {
            self.sink.deliver(Wake::TaskCompleted {
                task_id: task_id.clone(),
                outcome,
            });
        }
        Ok(task_id)
    }

    async fn cancel_task(&self, task_id: &str) -> CollabResult<()> {
        self.cancelled.lock().push(task_id.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub waiter_id: String,
    pub correlation_key: String,
    pub timeout_secs: Option<u64>,
}

/// Webhook bus that records registrations; tests deliver events by
/// correlation key or fire timeouts explicitly.
pub struct FakeWebhookBus {
    sink: WakeSink,
    counter: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
    unregistered: Mutex<Vec<String>>,
}

impl FakeWebhookBus {
    pub fn new(sink: WakeSink) -> Self {
        Self {
            sink,
            counter: AtomicU64::new(0),
            registrations: Mutex::new(Vec::new()),
            unregistered: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a payload to the most recent waiter registered for the key.
    /// Returns the waiter id, or `None` when nothing matches.
    pub fn deliver(&self, correlation_key: &str, payload: Value) -> Option<String> {
        let waiter_id = {
            let registrations = self.registrations.lock();
            registrations
                .iter()
                .rev()
                .find(|r| r.correlation_key == correlation_key)
                .map(|r| r.waiter_id.clone())?
        };
        self.sink.deliver(Wake::WebhookEvent {
            waiter_id: waiter_id.clone(),
            payload,
        });
        Some(waiter_id)
    }

    /// Fire the timeout for a registered waiter.
    pub fn time_out(&self, waiter_id: &str) {
        self.sink.deliver(Wake::WebhookTimeout {
            waiter_id: waiter_id.to_string(),
        });
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.lock().clone()
    }
}

#[async_trait]
impl WebhookBus for FakeWebhookBus {
    async fn register_waiter(
        &self,
        correlation_key: &str,
        timeout_secs: Option<u64>,
    ) -> CollabResult<String> {
        let waiter_id = format!("waiter-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.registrations.lock().push(Registration {
            waiter_id: waiter_id.clone(),
            correlation_key: correlation_key.to_string(),
            timeout_secs,
        });
        Ok(waiter_id)
    }

    async fn unregister(&self, waiter_id: &str) -> CollabResult<()> {
        self.unregistered.lock().push(waiter_id.to_string());
        Ok(())
    }
}

/// Timer service that never fires on its own; tests fire timers manually,
/// which keeps timing-sensitive assertions deterministic.
pub struct ManualTimerService {
    sink: WakeSink,
    counter: AtomicU64,
    scheduled: Mutex<Vec<(String, i64)>>,
    cancelled: Mutex<Vec<String>>,
}

impl ManualTimerService {
    pub fn new(sink: WakeSink) -> Self {
        Self {
            sink,
            counter: AtomicU64::new(0),
            scheduled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn scheduled(&self) -> Vec<(String, i64)> {
        self.scheduled.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }

    pub fn fire(&self, timer_id: &str) {
        self.sink.deliver(Wake::TimerFired {
            timer_id: timer_id.to_string(),
        });
    }

    /// Fire every scheduled timer with a deadline at or before `now_ms`.
    pub fn fire_due(&self, now_ms: i64) {
        let due: Vec<String> = self
            .scheduled
            .lock()
            .iter()
            .filter(|(_, fire_at)| *fire_at <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for timer_id in due {
            self.fire(&timer_id);
        }
    }
}

#[async_trait]
impl TimerService for ManualTimerService {
    async fn schedule_at(&self, fire_at_ms: i64) -> CollabResult<String> {
        let timer_id = format!("timer-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.scheduled.lock().push((timer_id.clone(), fire_at_ms));
        Ok(timer_id)
    }

    async fn cancel(&self, timer_id: &str) -> CollabResult<()> {
        self.cancelled.lock().push(timer_id.to_string());
        self.scheduled.lock().retain(|(id, _)| id != timer_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn sink() -> (WakeSink, mpsc::UnboundedReceiver<Wake>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WakeSink::new(tx), rx)
    }

    #[tokio::test]
    async fn test_scripted_session_auto_completes() {
        let (sink, mut rx) = sink();
        let sessions = FakeSessionService::new(sink);
        sessions.script_result(Ok(json!({"answer": 7})));

        let request = SessionRequest {
            agent_id: "a1".into(),
            prompt: "go".into(),
            config: Value::Null,
        };
        let session_id = sessions.start_session(&request).await.unwrap();
        assert_eq!(sessions.started().len(), 1);

        match rx.recv().await.unwrap() {
            Wake::SessionCompleted {
                session_id: id,
                outcome,
            } => {
                assert_eq!(id, session_id);
                assert_eq!(outcome.unwrap(), json!({"answer": 7}));
            }
            other => panic!("Unexpected wake: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_webhook_deliver_by_correlation() {
        let (sink, mut rx) = sink();
        let bus = FakeWebhookBus::new(sink);
        let waiter_id = bus.register_waiter("repo:1", None).await.unwrap();

        assert!(bus.deliver("repo:2", json!({})).is_none());
        assert_eq!(bus.deliver("repo:1", json!({"ok": true})), Some(waiter_id));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Wake::WebhookEvent { .. }
        ));
    }

    #[tokio::test]
    async fn test_manual_timer_fire_due() {
        let (sink, mut rx) = sink();
        let timers = ManualTimerService::new(sink);
        timers.schedule_at(100).await.unwrap();
        let late = timers.schedule_at(5_000).await.unwrap();

        timers.fire_due(1_000);
        match rx.recv().await.unwrap() {
            Wake::TimerFired { timer_id } => assert_ne!(timer_id, late),
            other => panic!("Unexpected wake: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
