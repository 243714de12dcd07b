//! In-process job queues
//!
//! Mirrors the Redis transport for single-process deployments and tests.
//! Each named queue is a `VecDeque` guarded by a mutex, with a `Notify`
//! waking blocked consumers. Delivery semantics match the contract: each
//! payload reaches exactly one consumer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{JobQueue, QueueError};

#[derive(Default)]
struct QueueState {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

/// In-process queue transport.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, queue: &str) -> Arc<QueueState> {
        let mut queues = self.queues.lock().expect("queue map poisoned");
        queues.entry(queue.to_string()).or_default().clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let state = self.state(queue);
        state
            .items
            .lock()
            .expect("queue poisoned")
            .push_back(payload.to_string());
        state.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let state = self.state(queue);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(payload) = state.items.lock().expect("queue poisoned").pop_front() {
                return Ok(Some(payload));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // notify_one stores a permit when no consumer is waiting, so a
            // push racing this gap still wakes us.
            let notified = state.notify.notified();
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let state = self.state(queue);
        let len = state.items.lock().expect("queue poisoned").len();
        Ok(len as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = MemoryQueue::new();
        queue.push("jobs:chunk", "a").await.unwrap();
        queue.push("jobs:chunk", "b").await.unwrap();

        assert_eq!(
            queue
                .pop("jobs:chunk", Duration::from_millis(10))
                .await
                .unwrap(),
            Some("a".to_string())
        );
        assert_eq!(
            queue
                .pop("jobs:chunk", Duration::from_millis(10))
                .await
                .unwrap(),
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_pop_times_out_empty() {
        let queue = MemoryQueue::new();
        let popped = queue
            .pop("jobs:embed", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop("jobs:resolve", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push("jobs:resolve", "doc-1").await.unwrap();

        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(popped, Some("doc-1".to_string()));
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let queue = MemoryQueue::new();
        queue.push("jobs:chunk", "a").await.unwrap();
        assert_eq!(queue.depth("jobs:chunk").await.unwrap(), 1);
        assert_eq!(queue.depth("jobs:embed").await.unwrap(), 0);
        assert_eq!(
            queue
                .pop("jobs:embed", Duration::from_millis(10))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_single_delivery_across_consumers() {
        let queue = Arc::new(MemoryQueue::new());
        queue.push("jobs:extract", "only-one").await.unwrap();

        let a = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop("jobs:extract", Duration::from_millis(50)).await })
        };
        let b = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop("jobs:extract", Duration::from_millis(50)).await })
        };

        let got_a = a.await.unwrap().unwrap();
        let got_b = b.await.unwrap().unwrap();
        let delivered: Vec<_> = [got_a, got_b].into_iter().flatten().collect();
        assert_eq!(delivered, vec!["only-one".to_string()]);
    }
}
