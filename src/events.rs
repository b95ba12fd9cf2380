//! Engine event notifications.
//!
//! The scheduler emits an event after every persisted transition.
//! Transports (WebSocket, SSE, polling) subscribe downstream; the core has
//! no knowledge of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: String,
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    RunPaused {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    RunResumed {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        run_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RunCancelled {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchSpawned {
        run_id: String,
        branch_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchActivated {
        run_id: String,
        branch_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchSuspended {
        run_id: String,
        branch_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchResumed {
        run_id: String,
        branch_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchCompleted {
        run_id: String,
        branch_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchJoined {
        run_id: String,
        branch_id: String,
        join_id: String,
        timestamp: DateTime<Utc>,
    },
    BranchFailed {
        run_id: String,
        branch_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: String,
        branch_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        run_id: String,
        branch_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out hub for engine events.
///
/// Emission is cheap when nobody listens: an atomic flag short-circuits
/// event construction at the call sites.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<EngineEvent>>>,
    active: AtomicBool,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new subscriber. Events emitted from now on are delivered
    /// until the receiver is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.write().push(tx);
        self.inner.active.store(true, Ordering::Relaxed);
        rx
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if !self.is_active() {
            return;
        }
        let mut subscribers = self.inner.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            self.inner.active.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EngineEvent {
        EngineEvent::RunStarted {
            run_id: "r-1".into(),
            workflow_id: "wf-1".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let hub = EventHub::new();
        assert!(!hub.is_active());
        hub.emit(sample_event());
    }

    #[tokio::test]
    async fn test_subscribe_receives_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        assert!(hub.is_active());

        hub.emit(sample_event());
        let event = rx.recv().await.unwrap();
        match event {
            EngineEvent::RunStarted { run_id, .. } => assert_eq!(run_id, "r-1"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        drop(rx);
        hub.emit(sample_event());
        assert!(!hub.is_active());
    }
}
