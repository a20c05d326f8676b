//! Job queue seam
//!
//! The runner consumes jobs through this trait; production deployments back
//! it with an external brokered store, tests and single-node deployments use
//! the in-memory channel implementation.

use crate::job::Job;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Abstraction over the work-item queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for execution
    async fn enqueue(&self, job: Job) -> Result<()>;

    /// Receive the next job; `None` when the queue has been closed and
    /// drained
    async fn dequeue(&self) -> Option<Job>;
}

/// Bounded in-process queue over a tokio channel.
pub struct InMemoryJobQueue {
    tx: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    rx: Mutex<mpsc::Receiver<Job>>,
}

impl InMemoryJobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    /// Close the producer side; workers drain the backlog and stop
    pub fn close(&self) {
        self.tx.lock().expect("queue sender lock poisoned").take();
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>> {
        self.tx
            .lock()
            .expect("queue sender lock poisoned")
            .clone()
            .ok_or(crate::Error::QueueClosed)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        self.sender()?
            .send(job)
            .await
            .map_err(|_| crate::Error::QueueClosed)
    }

    async fn dequeue(&self) -> Option<Job> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobPayload;

    #[tokio::test]
    async fn fifo_order() {
        let queue = InMemoryJobQueue::new(8);
        queue
            .enqueue(Job::new(JobPayload::FreshnessCheck))
            .await
            .unwrap();
        queue
            .enqueue(Job::new(JobPayload::TimelinessCheck {
                lookback_minutes: 60,
            }))
            .await
            .unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.kind().as_str(), "freshness_check");
        let second = queue.dequeue().await.unwrap();
        assert_eq!(second.kind().as_str(), "timeliness_check");
    }

    #[tokio::test]
    async fn close_drains_backlog_then_stops() {
        let queue = InMemoryJobQueue::new(8);
        queue
            .enqueue(Job::new(JobPayload::FreshnessCheck))
            .await
            .unwrap();
        queue.close();

        assert!(matches!(
            queue.enqueue(Job::new(JobPayload::FreshnessCheck)).await,
            Err(crate::Error::QueueClosed)
        ));
        assert!(queue.dequeue().await.is_some());
        assert!(queue.dequeue().await.is_none());
    }
}
