//! Queue error types

use thiserror::Error;

/// Errors from the job-queue transport
#[derive(Error, Debug)]
pub enum QueueError {
    /// Failed to connect to or talk to the backing store
    #[error("Queue connection error: {0}")]
    Connection(String),

    /// Backend returned an unexpected response
    #[error("Queue backend error: {0}")]
    Backend(String),
}

impl From<deadpool_redis::PoolError> for QueueError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for QueueError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        Self::Backend(e.to_string())
    }
}
