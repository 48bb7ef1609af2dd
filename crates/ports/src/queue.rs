//! Task queue port.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PortsError;

/// A dequeued task, held in flight until acked or nacked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Queue-assigned id, used for ack/nack.
    pub id: String,
    /// Opaque payload.
    pub payload: serde_json::Value,
    /// How many times this task has been handed out, this delivery included.
    pub deliveries: u32,
}

/// At-least-once work queue.
///
/// A dequeued task stays in flight until [`ack`](Self::ack) drops it or
/// [`nack`](Self::nack) puts it back.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a payload. Returns the task id.
    async fn enqueue(&self, payload: serde_json::Value) -> Result<String, PortsError>;

    /// Wait up to `timeout` for the next task.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedTask>, PortsError>;

    /// Confirm a task was processed.
    async fn ack(&self, task_id: &str) -> Result<(), PortsError>;

    /// Return a task to the queue.
    async fn nack(&self, task_id: &str) -> Result<(), PortsError>;

    /// Tasks waiting to be dequeued.
    async fn len(&self) -> Result<usize, PortsError>;

    /// Whether nothing is waiting.
    async fn is_empty(&self) -> Result<bool, PortsError> {
        Ok(self.len().await? == 0)
    }
}
