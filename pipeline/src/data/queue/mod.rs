//! Durable FIFO job queues
//!
//! Queues hand off document IDs between stages; they hold no authoritative
//! state. A lost message is recoverable from the document's stage column,
//! so the contract is at-least-once delivery with best-effort FIFO.
//!
//! Two backends exist behind [`JobQueue`]: Redis lists for multi-process
//! deployments and an in-process backend for single-process runs and tests.

mod error;
pub mod memory;
pub mod redis;

pub use error::QueueError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Named FIFO queue transport.
///
/// Payloads are opaque UTF-8 strings, in practice a single UUID.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a payload to the tail of `queue`.
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError>;

    /// Block up to `timeout` for a payload from the head of `queue`.
    /// Returns `None` on timeout. Each payload is delivered to exactly one
    /// consumer.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError>;

    /// Number of payloads currently waiting in `queue`.
    async fn depth(&self, queue: &str) -> Result<u64, QueueError>;

    /// Backend name for logs and stats
    fn backend_name(&self) -> &'static str;
}

/// Select a queue backend from configuration: a Redis URL picks the Redis
/// transport, its absence the in-process one.
pub async fn connect(redis_url: Option<&str>) -> Result<Arc<dyn JobQueue>, QueueError> {
    match redis_url {
        Some(url) => Ok(Arc::new(redis::RedisQueue::new(url).await?)),
        None => Ok(Arc::new(memory::MemoryQueue::new())),
    }
}
