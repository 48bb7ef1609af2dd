#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow in-memory queue
//!
//! Bounded [`TaskQueue`] over a `tokio::sync::mpsc` channel, with dequeued
//! tasks parked in a `DashMap` until they are acked or nacked. Nothing
//! survives a restart, so it suits tests, the CLI simulator and
//! single-process deployments.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use aecflow_ports::TaskQueue;
//! use aecflow_queue_memory::MemoryQueue;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = MemoryQueue::new(64);
//! queue.enqueue(serde_json::json!({"kind": "begin"})).await?;
//! if let Some(task) = queue.dequeue(Duration::from_millis(100)).await? {
//!     queue.ack(&task.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aecflow_ports::{PortsError, QueuedTask, TaskQueue};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};

/// In-memory bounded task queue.
#[derive(Debug)]
pub struct MemoryQueue {
    sender: mpsc::Sender<QueuedTask>,
    receiver: Mutex<mpsc::Receiver<QueuedTask>>,
    in_flight: DashMap<String, QueuedTask>,
    queued: AtomicUsize,
}

impl MemoryQueue {
    /// Create a queue holding at most `capacity` waiting tasks.
    ///
    /// Enqueueing into a full queue fails instead of waiting.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            in_flight: DashMap::new(),
            queued: AtomicUsize::new(0),
        }
    }

    /// Tasks dequeued but not yet acked or nacked.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn push(&self, task: QueuedTask) -> Result<(), PortsError> {
        self.sender
            .try_send(task)
            .map_err(|e| PortsError::Internal(format!("queue full or closed: {e}")))?;
        self.queued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn unknown(task_id: &str) -> PortsError {
        PortsError::NotFound {
            entity: "task",
            id: task_id.to_owned(),
        }
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> Result<String, PortsError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.push(QueuedTask {
            id: id.clone(),
            payload,
            deliveries: 0,
        })?;
        Ok(id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedTask>, PortsError> {
        let mut rx = self.receiver.lock().await;
        // Elapsed and a closed channel both mean "nothing to do".
        let Ok(Some(mut task)) = tokio::time::timeout(timeout, rx.recv()).await else {
            return Ok(None);
        };
        self.queued.fetch_sub(1, Ordering::Relaxed);
        task.deliveries += 1;
        self.in_flight.insert(task.id.clone(), task.clone());
        Ok(Some(task))
    }

    async fn ack(&self, task_id: &str) -> Result<(), PortsError> {
        self.in_flight
            .remove(task_id)
            .map(drop)
            .ok_or_else(|| Self::unknown(task_id))
    }

    async fn nack(&self, task_id: &str) -> Result<(), PortsError> {
        let (_, task) = self
            .in_flight
            .remove(task_id)
            .ok_or_else(|| Self::unknown(task_id))?;
        self.push(task)
    }

    async fn len(&self) -> Result<usize, PortsError> {
        Ok(self.queued.load(Ordering::Relaxed))
    }
}
