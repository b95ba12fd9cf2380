use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::runtime::IdGenerator;

use super::{CollabResult, TimerService, Wake, WakeSink};

/// Timer service backed by `tokio::time`. A fire time in the past fires on
/// the next tick, so zero-duration delays still suspend and resume
/// asynchronously.
pub struct TokioTimerService {
    sink: WakeSink,
    ids: Arc<dyn IdGenerator>,
    pending: Arc<DashMap<String, JoinHandle<()>>>,
}

impl TokioTimerService {
    pub fn new(sink: WakeSink, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            sink,
            ids,
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl TimerService for TokioTimerService {
    async fn schedule_at(&self, fire_at_ms: i64) -> CollabResult<String> {
        let timer_id = self.ids.next_id();
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let delay = Duration::from_millis(fire_at_ms.saturating_sub(now_ms).max(0) as u64);

        let sink = self.sink.clone();
        let pending = Arc::clone(&self.pending);
        let id = timer_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove(&id);
            sink.deliver(Wake::TimerFired { timer_id: id });
        });
        self.pending.insert(timer_id.clone(), handle);
        Ok(timer_id)
    }

    async fn cancel(&self, timer_id: &str) -> CollabResult<()> {
        if let Some((_, handle)) = self.pending.remove(timer_id) {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeIdGenerator;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_past_deadline_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TokioTimerService::new(WakeSink::new(tx), Arc::new(FakeIdGenerator::new("t")));

        let timer_id = timers.schedule_at(0).await.unwrap();
        let wake = rx.recv().await.unwrap();
        match wake {
            Wake::TimerFired { timer_id: fired } => assert_eq!(fired, timer_id),
            other => panic!("Unexpected wake: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_suppresses_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TokioTimerService::new(WakeSink::new(tx), Arc::new(FakeIdGenerator::new("t")));

        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let timer_id = timers.schedule_at(now_ms + 60_000).await.unwrap();
        timers.cancel(&timer_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
